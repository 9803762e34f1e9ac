//! Approval gate for proposed tool calls
//!
//! Runs before a batch executes (classification plus one operator decision)
//! and again after the batch finishes, when applied file mutations can be
//! undone selectively.

mod confirm;
mod decision;
mod gate;
mod prompt;

pub use confirm::{confirm_mutations, ConfirmReport};
pub use decision::Decision;
pub use gate::{ApprovalGate, Classification, DeniedCall, Verdict};
pub use prompt::{Prompter, ScriptedPrompter, StdinPrompter};
