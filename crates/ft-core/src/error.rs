//! Core error types for fleetterm

use ft_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the workspace
pub type Result<T, E = FtError> = std::result::Result<T, E>;

/// Top-level error type for fleetterm operations
///
/// A shell command that outlives its poll budget is not an error; see
/// `ShellOutput::timed_out` in the agent crate.
#[derive(Error, Debug)]
pub enum FtError {
    /// Unknown machine, slot, process, task or backup
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Agent reported failure or sent something malformed
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Dial, read or write failure talking to an agent
    #[error("Transport error: {0}")]
    Transport(String),

    /// A text replacement did not match exactly once
    #[error("Edit conflict in {}: expected exactly 1 match, found {count}", path.display())]
    Conflict { path: PathBuf, count: usize },

    /// Bad arguments
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Filesystem failure on a named path
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Saving persistent state failed; in-memory state is still current
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl FtError {
    /// Shorthand for a NotFound error
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        FtError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Attach a path to an I/O error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FtError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error is a NotFound of any kind
    pub fn is_not_found(&self) -> bool {
        matches!(self, FtError::NotFound { .. })
    }
}

impl From<ProtocolError> for FtError {
    fn from(err: ProtocolError) -> Self {
        if err.is_transport() {
            FtError::Transport(err.to_string())
        } else {
            FtError::Protocol(err.to_string())
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
