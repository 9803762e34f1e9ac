//! Core domain types

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FtError;

/// Id of the machine that is always present: the control plane's own host
pub const LOCAL_MACHINE: &str = "local";

/// Unique identifier for a machine
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MachineId(pub String);

impl MachineId {
    /// Create a new machine ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id of the local machine
    pub fn local() -> Self {
        Self(LOCAL_MACHINE.to_string())
    }

    /// Whether this is the local machine
    pub fn is_local(&self) -> bool {
        self.0 == LOCAL_MACHINE
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MachineId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MachineId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How commands reach a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineKind {
    /// The control plane's own persistent shell
    Local,
    /// A remote agent reached over the wire protocol
    Agent,
}

impl fmt::Display for MachineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineKind::Local => write!(f, "local"),
            MachineKind::Agent => write!(f, "agent"),
        }
    }
}

/// A registered execution target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    pub host: String,
    pub port: u16,
    pub kind: MachineKind,
    #[serde(default)]
    pub description: String,
    /// Shared secret presented to the agent on every call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Last known working directory, refreshed after each command
    #[serde(skip)]
    pub current_dir: Option<String>,
}

impl Machine {
    /// The always-present local machine
    pub fn local() -> Self {
        Self {
            id: MachineId::local(),
            host: "localhost".to_string(),
            port: 0,
            kind: MachineKind::Local,
            description: "local shell".to_string(),
            secret: None,
            current_dir: None,
        }
    }

    /// A freshly registered agent machine
    pub fn agent(
        id: MachineId,
        host: impl Into<String>,
        port: u16,
        secret: impl Into<String>,
        working_dir: impl Into<String>,
    ) -> Self {
        let host = host.into();
        Self {
            id,
            description: format!("remote server ({})", host),
            host,
            port,
            kind: MachineKind::Agent,
            secret: Some(secret.into()),
            current_dir: Some(working_dir.into()),
        }
    }

    /// `host:port` of the agent listener
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One of the two terminal slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotId {
    Slot1,
    Slot2,
}

impl SlotId {
    /// Both slots in display order
    pub const ALL: [SlotId; 2] = [SlotId::Slot1, SlotId::Slot2];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotId::Slot1 => "slot1",
            SlotId::Slot2 => "slot2",
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotId {
    type Err = FtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slot1" | "1" => Ok(SlotId::Slot1),
            "slot2" | "2" => Ok(SlotId::Slot2),
            other => Err(FtError::not_found("slot", other)),
        }
    }
}

/// Identifier of an interactive process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(pub u64);

impl ProcessId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc-{}", self.0)
    }
}

impl FromStr for ProcessId {
    type Err = FtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        trimmed
            .strip_prefix("proc-")
            .unwrap_or(trimmed)
            .parse::<u64>()
            .map(ProcessId)
            .map_err(|_| FtError::not_found("process", trimmed))
    }
}

/// Identifier of a sync task: 8 lowercase hex characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a random task id
    pub fn generate() -> Self {
        let bytes: [u8; 4] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_id_local() {
        assert!(MachineId::local().is_local());
        assert!(!MachineId::new("web1").is_local());
        assert_eq!(MachineId::from("db").to_string(), "db");
    }

    #[test]
    fn test_machine_secret_and_cwd_serialization() {
        let mut machine = Machine::agent(MachineId::new("web1"), "10.0.0.5", 38888, "s3cret", "/root");
        machine.current_dir = Some("/var/log".into());
        let json = serde_json::to_value(&machine).unwrap();
        assert_eq!(json["kind"], "agent");
        assert_eq!(json["secret"], "s3cret");
        assert!(json.get("current_dir").is_none());
        assert_eq!(machine.description, "remote server (10.0.0.5)");
        assert_eq!(machine.address(), "10.0.0.5:38888");

        let local = serde_json::to_value(Machine::local()).unwrap();
        assert!(local.get("secret").is_none());
    }

    #[test]
    fn test_slot_parse() {
        assert_eq!("slot2".parse::<SlotId>().unwrap(), SlotId::Slot2);
        assert_eq!("SLOT1".parse::<SlotId>().unwrap(), SlotId::Slot1);
        assert!("slot3".parse::<SlotId>().is_err());
        assert_eq!(serde_json::to_string(&SlotId::Slot1).unwrap(), r#""slot1""#);
    }

    #[test]
    fn test_process_id_roundtrip_text() {
        let id = ProcessId::new(7);
        assert_eq!(id.to_string(), "proc-7");
        assert_eq!("proc-7".parse::<ProcessId>().unwrap(), id);
        assert_eq!("7".parse::<ProcessId>().unwrap(), id);
        assert!("proc-x".parse::<ProcessId>().is_err());
    }

    #[test]
    fn test_task_id_format() {
        let id = TaskId::generate();
        assert_eq!(id.as_str().len(), 8);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
