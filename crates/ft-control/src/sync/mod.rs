//! File and directory sync between local storage and agents

mod engine;
mod task;

pub(crate) use engine::shell_quote;
pub use engine::{SyncEngine, SyncReport};
pub use task::{
    Direction, SyncTask, TaskProgress, TaskState, TaskStatus, TaskTable, TransferSummary,
};
