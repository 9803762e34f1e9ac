//! ft-core: Core abstractions and configuration for fleetterm
//!
//! This crate provides shared types, the error taxonomy, configuration
//! structures and small helpers used by the agent and the control plane.

pub mod archive;
pub mod auth;
pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use error::{ConfigError, FtError, Result};
pub use types::{Machine, MachineId, MachineKind, ProcessId, SlotId, TaskId, LOCAL_MACHINE};
