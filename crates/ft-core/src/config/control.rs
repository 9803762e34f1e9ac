//! Control plane configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// Configuration for the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Where machines and slot bindings are persisted
    pub registry_path: PathBuf,

    /// Shared key for agents registered before per-agent secrets existed.
    ///
    /// Only used for machines that carry no secret of their own.
    pub legacy_global_secret: Option<String>,

    /// Agent client settings
    pub agent: AgentClientConfig,

    /// Local persistent shell
    pub shell: ShellConfig,

    /// File sync settings
    pub sync: SyncConfig,

    /// Agent installation
    pub bootstrap: BootstrapConfig,

    /// Command classification lists
    pub approval: ApprovalConfig,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            registry_path: super::default_config_dir().join("registry.json"),
            legacy_global_secret: None,
            agent: AgentClientConfig::default(),
            shell: ShellConfig::default(),
            sync: SyncConfig::default(),
            bootstrap: BootstrapConfig::default(),
            approval: ApprovalConfig::default(),
        }
    }
}

/// How the control plane dials agents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentClientConfig {
    /// Bound on establishing the TCP connection; calls themselves have no timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Persistent shell settings, shared by the control plane and the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Shell binary to spawn
    pub program: String,

    /// Starting directory, defaults to the home directory
    pub working_dir: Option<PathBuf>,

    /// Delay between checks for the completion marker
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,

    /// Number of checks before returning partial output
    pub max_polls: u32,

    /// Time given to shell startup output before it is discarded
    #[serde(with = "duration_millis")]
    pub settle: Duration,

    /// Lines kept per process output buffer
    pub buffer_capacity: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: "bash".to_string(),
            working_dir: None,
            poll_interval: Duration::from_millis(100),
            max_polls: 50,
            settle: Duration::from_millis(500),
            buffer_capacity: 1000,
        }
    }
}

impl ShellConfig {
    /// Directory the shell starts in
    pub fn start_dir(&self) -> Option<PathBuf> {
        self.working_dir.clone().or_else(dirs::home_dir)
    }
}

/// File sync settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How long a push or pull may block before it moves to the background
    #[serde(with = "duration_secs")]
    pub foreground_window: Duration,

    /// Bytes per upload/download call
    pub chunk_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            foreground_window: Duration::from_secs(5),
            chunk_size: 1024 * 1024,
        }
    }
}

/// Agent installation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Installer invoked as `<script> <host> <user> <credential> <alias> <secret>`
    pub script: Option<PathBuf>,

    /// Working directory recorded for newly registered agents
    pub default_agent_dir: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            script: None,
            default_agent_dir: "/root".to_string(),
        }
    }
}

/// Command classification lists, matched case-insensitively by prefix
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Read-only commands that run without asking
    pub allowlist: Vec<String>,

    /// Full-screen or interactive programs that are never run
    pub denylist: Vec<String>,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        let allow = [
            "ls", "dir", "pwd", "cd", "tree", "pushd", "popd", "cat", "type", "head", "tail",
            "echo", "Get-Content", "whoami", "hostname", "date", "time", "ver", "uname",
            "systeminfo", "ps", "tasklist", "Get-Process", "ipconfig", "ifconfig", "ping",
            "tracert", "nslookup", "git status", "git log", "git diff", "git branch", "which",
            "where", "env", "printenv", "set", "Get-Variable",
        ];
        let deny = [
            "nano", "vim", "vi", "emacs", "notepad", "mysql", "psql", "mongo", "redis-cli",
            "top", "htop", "less", "more",
        ];
        Self {
            allowlist: allow.iter().map(|s| s.to_string()).collect(),
            denylist: deny.iter().map(|s| s.to_string()).collect(),
        }
    }
}
