//! Agent configuration

use serde::{Deserialize, Serialize};

use super::ShellConfig;

/// Configuration for the remote agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Address to listen on
    pub bind_address: String,

    /// Secret callers must present as `api_key`
    pub secret: Option<String>,

    /// Persistent shell settings
    pub shell: ShellConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{}", ft_protocol::DEFAULT_AGENT_PORT),
            secret: None,
            shell: ShellConfig::default(),
        }
    }
}
