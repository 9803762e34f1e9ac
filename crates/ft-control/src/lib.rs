//! ft-control: the fleetterm control plane
//!
//! Drives a set of registered machines (the local shell plus remote agents)
//! through two terminal slots, moves files to and from agents, keeps a
//! backup of every file it mutates, and gates risky tool calls behind an
//! operator decision.

pub mod approval;
pub mod backup;
pub mod client;
pub mod dispatch;
pub mod inspect;
pub mod interrupt;
pub mod mutation;
pub mod registry;
pub mod state;
pub mod sync;

pub use backup::BackupLedger;
pub use client::{AgentClient, AgentEndpoint};
pub use dispatch::{ToolAction, ToolCall, ToolDispatcher, ToolOutcome, ToolResult};
pub use interrupt::InterruptFlag;
pub use registry::Registry;
pub use state::ControlState;
pub use sync::SyncEngine;
