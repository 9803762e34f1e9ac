//! Shared agent state

use std::sync::Arc;

use ft_core::config::AgentConfig;

use crate::shell::ShellEngine;

/// State shared by every connection the agent serves
pub struct AgentState {
    /// Configuration
    pub config: AgentConfig,
    /// Secret callers must present
    secret: String,
    /// Persistent shell used by `execute`
    pub shell: Arc<ShellEngine>,
}

impl AgentState {
    pub fn new(config: AgentConfig, secret: String, shell: Arc<ShellEngine>) -> Self {
        Self {
            config,
            secret,
            shell,
        }
    }

    /// Check a presented `api_key`
    pub fn authorize(&self, api_key: &str) -> bool {
        ft_core::auth::validate_secret(api_key, &self.secret)
    }
}
