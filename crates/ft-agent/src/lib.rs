//! ft-agent: persistent shell engine and agent listener
//!
//! The shell engine gives callers a shell whose working directory and
//! environment persist between commands, plus separate interactive
//! processes for programs that need two-way input. The control plane uses
//! it for the local machine; the agent binary wraps it in a TCP listener
//! that serves the wire protocol's actions on a remote machine.

pub mod handler;
pub mod server;
pub mod shell;
pub mod state;

pub use server::AgentServer;
pub use shell::{ProcessOutput, ProcessStatus, ShellEngine, ShellOutput};
pub use state::AgentState;
