//! Persistent shell engine
//!
//! Both the shared persistent shell and interactive processes are
//! [`ProcessHandle`]s tagged with a [`ProcessKind`]; they share the output
//! ring buffer, reader tasks and exit watcher.

mod buffer;
mod engine;
mod process;

pub use engine::{ProcessInfo, ProcessOutput, ShellEngine, ShellOutput};
pub use process::{ProcessHandle, ProcessKind, ProcessStatus};
