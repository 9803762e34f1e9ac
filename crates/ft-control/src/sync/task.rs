//! Sync task bookkeeping
//!
//! One lock-guarded table of tasks. The transfer worker is the only writer
//! of progress fields; status queries read under the same lock.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use ft_core::time::{eta, format_duration, format_rate, format_size, throughput};
use ft_core::{FtError, MachineId, Result, TaskId};

/// Which way bytes move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Local to agent
    Push,
    /// Agent to local
    Pull,
}

/// Lifecycle of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Running,
    Completed,
    Failed,
}

/// A finished transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSummary {
    pub direction: Direction,
    pub machine: MachineId,
    pub local_path: PathBuf,
    pub remote_path: String,
    pub is_dir: bool,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl TransferSummary {
    pub fn throughput(&self) -> f64 {
        throughput(self.bytes, self.elapsed)
    }
}

impl fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = if self.is_dir { "directory" } else { "file" };
        match self.direction {
            Direction::Push => write!(
                f,
                "pushed {} {} to {}:{}",
                what,
                self.local_path.display(),
                self.machine,
                self.remote_path
            )?,
            Direction::Pull => write!(
                f,
                "pulled {} {}:{} to {}",
                what,
                self.machine,
                self.remote_path,
                self.local_path.display()
            )?,
        }
        write!(
            f,
            " ({} in {}, {})",
            format_size(self.bytes),
            format_duration(self.elapsed),
            format_rate(self.throughput())
        )
    }
}

/// Live view of a running task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskProgress {
    pub id: TaskId,
    pub direction: Direction,
    pub machine: MachineId,
    pub transferred: u64,
    pub total_size: Option<u64>,
    pub elapsed: Duration,
}

impl TaskProgress {
    pub fn throughput(&self) -> f64 {
        throughput(self.transferred, self.elapsed)
    }

    /// Percentage done, when the total is known
    pub fn percent(&self) -> Option<f64> {
        match self.total_size {
            Some(0) => Some(100.0),
            Some(total) => Some(self.transferred as f64 * 100.0 / total as f64),
            None => None,
        }
    }

    /// Estimated time remaining, when it can be computed
    pub fn eta(&self) -> Option<Duration> {
        let total = self.total_size?;
        eta(total.saturating_sub(self.transferred), self.throughput())
    }
}

impl fmt::Display for TaskProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task {} running: {}", self.id, format_size(self.transferred))?;
        if let (Some(total), Some(pct)) = (self.total_size, self.percent()) {
            write!(f, " of {} ({:.0}%)", format_size(total), pct)?;
        }
        write!(f, ", {}", format_rate(self.throughput()))?;
        if let Some(eta) = self.eta() {
            write!(f, ", about {} left", format_duration(eta))?;
        }
        Ok(())
    }
}

/// Result of a status query
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Running(TaskProgress),
    Completed(TransferSummary),
    Failed { id: TaskId, error: String },
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Running(progress) => write!(f, "{}", progress),
            TaskStatus::Completed(summary) => write!(f, "{}", summary),
            TaskStatus::Failed { id, error } => write!(f, "task {} failed: {}", id, error),
        }
    }
}

/// One in-flight or recently finished transfer
#[derive(Debug, Clone)]
pub struct SyncTask {
    pub id: TaskId,
    pub direction: Direction,
    pub machine: MachineId,
    pub local_path: PathBuf,
    pub remote_path: String,
    pub is_dir: bool,
    pub total_size: Option<u64>,
    pub transferred: u64,
    pub state: TaskState,
    pub started: Instant,
    pub finished: Option<Instant>,
    pub error: Option<String>,
}

impl SyncTask {
    pub fn new(
        direction: Direction,
        machine: MachineId,
        local_path: PathBuf,
        remote_path: String,
    ) -> Self {
        Self {
            id: TaskId::generate(),
            direction,
            machine,
            local_path,
            remote_path,
            is_dir: false,
            total_size: None,
            transferred: 0,
            state: TaskState::Running,
            started: Instant::now(),
            finished: None,
            error: None,
        }
    }

    fn elapsed(&self) -> Duration {
        self.finished.unwrap_or_else(Instant::now) - self.started
    }

    fn progress(&self) -> TaskProgress {
        TaskProgress {
            id: self.id.clone(),
            direction: self.direction,
            machine: self.machine.clone(),
            transferred: self.transferred,
            total_size: self.total_size,
            elapsed: self.elapsed(),
        }
    }

    fn summary(&self) -> TransferSummary {
        TransferSummary {
            direction: self.direction,
            machine: self.machine.clone(),
            local_path: self.local_path.clone(),
            remote_path: self.remote_path.clone(),
            is_dir: self.is_dir,
            bytes: self.total_size.unwrap_or(self.transferred),
            elapsed: self.elapsed(),
        }
    }
}

/// Table of sync tasks keyed by id
#[derive(Debug, Default)]
pub struct TaskTable {
    tasks: Mutex<HashMap<TaskId, SyncTask>>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, SyncTask>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, task: SyncTask) -> TaskId {
        let id = task.id.clone();
        self.lock().insert(id.clone(), task);
        id
    }

    /// Record what is being moved once it is known
    pub fn set_total(&self, id: &TaskId, total: u64, is_dir: bool) {
        if let Some(task) = self.lock().get_mut(id) {
            task.total_size = Some(total);
            task.is_dir = is_dir;
            task.transferred = task.transferred.min(total);
        }
    }

    /// Advance progress; never moves backwards or past the total
    pub fn advance(&self, id: &TaskId, transferred: u64) {
        if let Some(task) = self.lock().get_mut(id) {
            let capped = match task.total_size {
                Some(total) => transferred.min(total),
                None => transferred,
            };
            task.transferred = task.transferred.max(capped);
            tracing::trace!("Task {} at {} bytes", id, task.transferred);
        }
    }

    /// Mark finished and return the summary
    pub fn complete(&self, id: &TaskId) -> Option<TransferSummary> {
        let mut tasks = self.lock();
        let task = tasks.get_mut(id)?;
        if let Some(total) = task.total_size {
            task.transferred = total;
        }
        task.state = TaskState::Completed;
        task.finished = Some(Instant::now());
        Some(task.summary())
    }

    /// Mark failed with the underlying error
    pub fn fail(&self, id: &TaskId, error: &str) {
        if let Some(task) = self.lock().get_mut(id) {
            task.state = TaskState::Failed;
            task.finished = Some(Instant::now());
            task.error = Some(error.to_string());
        }
    }

    pub fn remove(&self, id: &TaskId) -> Option<SyncTask> {
        self.lock().remove(id)
    }

    /// Live progress of a task in any state
    pub fn progress(&self, id: &TaskId) -> Result<TaskProgress> {
        self.lock()
            .get(id)
            .map(SyncTask::progress)
            .ok_or_else(|| FtError::not_found("task", id.as_str()))
    }

    /// Report a task's state, deleting it once a finished outcome is read
    pub fn status(&self, id: &TaskId) -> Result<TaskStatus> {
        let mut tasks = self.lock();
        let task = tasks
            .get(id)
            .ok_or_else(|| FtError::not_found("task", id.as_str()))?;

        let status = match task.state {
            TaskState::Running => return Ok(TaskStatus::Running(task.progress())),
            TaskState::Completed => TaskStatus::Completed(task.summary()),
            TaskState::Failed => TaskStatus::Failed {
                id: id.clone(),
                error: task.error.clone().unwrap_or_default(),
            },
        };
        tasks.remove(id);
        Ok(status)
    }

    /// Ids of all tasks still in the table
    pub fn ids(&self) -> Vec<TaskId> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
