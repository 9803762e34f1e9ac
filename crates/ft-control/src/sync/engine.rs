//! Push and pull with a foreground window
//!
//! Every transfer runs on its own worker task. The caller waits for at most
//! the foreground window; if the worker is still busy by then the call
//! returns the task id and progress, and the worker carries on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ft_core::config::SyncConfig;
use ft_core::{archive, FtError, MachineId, Result, TaskId};

use crate::client::{AgentClient, AgentEndpoint};
use crate::registry::Registry;

use super::task::{Direction, SyncTask, TaskProgress, TaskStatus, TaskTable, TransferSummary};

/// Outcome of a push or pull call
#[derive(Debug, Clone, PartialEq)]
pub enum SyncReport {
    /// Finished inside the foreground window
    Completed(TransferSummary),
    /// Still running; poll with the task id
    Background(TaskProgress),
}

impl std::fmt::Display for SyncReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncReport::Completed(summary) => write!(f, "{}", summary),
            SyncReport::Background(progress) => write!(
                f,
                "transfer continues in background as task {} ({}); check it with sync_status",
                progress.id, progress
            ),
        }
    }
}

/// Moves files and directories between local storage and agents
pub struct SyncEngine {
    registry: Arc<Registry>,
    client: Arc<AgentClient>,
    tasks: Arc<TaskTable>,
    config: SyncConfig,
}

/// Everything a worker needs, owned so it can outlive the caller
struct Transfer {
    id: TaskId,
    endpoint: AgentEndpoint,
    client: Arc<AgentClient>,
    tasks: Arc<TaskTable>,
    local: PathBuf,
    remote: String,
    is_dir: bool,
    chunk_size: usize,
}

impl SyncEngine {
    pub fn new(registry: Arc<Registry>, client: Arc<AgentClient>, config: SyncConfig) -> Self {
        Self {
            registry,
            client,
            tasks: Arc::new(TaskTable::new()),
            config,
        }
    }

    pub fn tasks(&self) -> &Arc<TaskTable> {
        &self.tasks
    }

    /// Copy a local file or directory to `remote` on `machine`
    pub async fn push(&self, machine: &MachineId, local: &Path, remote: &str) -> Result<SyncReport> {
        let endpoint = self.registry.endpoint(machine)?;
        let meta = tokio::fs::metadata(local)
            .await
            .map_err(|e| FtError::io(local, e))?;

        let transfer = self.prepare(Direction::Push, endpoint, local, remote, meta.is_dir());
        self.run(transfer, Direction::Push).await
    }

    /// Copy `remote` on `machine` to a local path
    pub async fn pull(&self, machine: &MachineId, remote: &str, local: &Path) -> Result<SyncReport> {
        let endpoint = self.registry.endpoint(machine)?;

        let kind = self
            .client
            .execute(
                &endpoint,
                &format!("[ -d {} ] && echo __DIR__ || echo __FILE__", shell_quote(remote)),
            )
            .await?;
        if !kind.cwd.is_empty() {
            self.registry.record_cwd(machine, &kind.cwd)?;
        }
        let is_dir = kind.output.lines().any(|l| l.trim() == "__DIR__");

        let transfer = self.prepare(Direction::Pull, endpoint, local, remote, is_dir);
        self.run(transfer, Direction::Pull).await
    }

    /// Progress of a running task, or its outcome exactly once
    pub fn status(&self, id: &TaskId) -> Result<TaskStatus> {
        self.tasks.status(id)
    }

    fn prepare(
        &self,
        direction: Direction,
        endpoint: AgentEndpoint,
        local: &Path,
        remote: &str,
        is_dir: bool,
    ) -> Transfer {
        let task = SyncTask::new(
            direction,
            endpoint.machine.clone(),
            local.to_path_buf(),
            remote.to_string(),
        );
        let id = self.tasks.insert(task);
        Transfer {
            id,
            endpoint,
            client: Arc::clone(&self.client),
            tasks: Arc::clone(&self.tasks),
            local: local.to_path_buf(),
            remote: remote.to_string(),
            is_dir,
            chunk_size: self.config.chunk_size.max(1),
        }
    }

    async fn run(&self, transfer: Transfer, direction: Direction) -> Result<SyncReport> {
        let id = transfer.id.clone();
        tracing::info!(
            "Task {}: {:?} {} {} <-> {}:{}",
            id,
            direction,
            if transfer.is_dir { "directory" } else { "file" },
            transfer.local.display(),
            transfer.endpoint.machine,
            transfer.remote
        );

        let mut worker = tokio::spawn(async move {
            let tasks = Arc::clone(&transfer.tasks);
            let id = transfer.id.clone();
            let result = match direction {
                Direction::Push => transfer.push().await,
                Direction::Pull => transfer.pull().await,
            };
            match result {
                Ok(()) => tasks
                    .complete(&id)
                    .ok_or_else(|| FtError::not_found("task", id.as_str())),
                Err(e) => {
                    tracing::warn!("Task {} failed: {}", id, e);
                    tasks.fail(&id, &e.to_string());
                    Err(e)
                }
            }
        });

        tokio::select! {
            joined = &mut worker => {
                self.tasks.remove(&id);
                match joined {
                    Ok(result) => result.map(SyncReport::Completed),
                    Err(e) => Err(FtError::Protocol(format!("transfer worker for task {} died: {}", id, e))),
                }
            }
            _ = tokio::time::sleep(self.config.foreground_window) => {
                let progress = self.tasks.progress(&id)?;
                tracing::info!("Task {} moved to background", id);
                Ok(SyncReport::Background(progress))
            }
        }
    }
}

impl Transfer {
    async fn push(&self) -> Result<()> {
        if self.is_dir {
            let dir = self.local.clone();
            let bytes = tokio::task::spawn_blocking(move || archive::pack_dir(&dir))
                .await
                .map_err(|e| FtError::Protocol(format!("archive task failed: {}", e)))??;
            let total = bytes.len() as u64;
            self.tasks.set_total(&self.id, total, true);

            self.client
                .tar_upload(&self.endpoint, &self.remote, &bytes)
                .await?;
            self.tasks.advance(&self.id, total);
            return Ok(());
        }

        let bytes = tokio::fs::read(&self.local)
            .await
            .map_err(|e| FtError::io(&self.local, e))?;
        let total = bytes.len() as u64;
        self.tasks.set_total(&self.id, total, false);

        if bytes.is_empty() {
            self.client
                .upload(&self.endpoint, &self.remote, &[], 0, 0)
                .await?;
            return Ok(());
        }

        let mut offset = 0u64;
        for chunk in bytes.chunks(self.chunk_size) {
            let acked = self
                .client
                .upload(&self.endpoint, &self.remote, chunk, offset, total)
                .await?;
            offset += chunk.len() as u64;
            self.tasks.advance(&self.id, acked);
        }
        Ok(())
    }

    async fn pull(&self) -> Result<()> {
        if self.is_dir {
            let bytes = self
                .client
                .tar_download(&self.endpoint, &self.remote)
                .await?;
            let total = bytes.len() as u64;
            self.tasks.set_total(&self.id, total, true);

            let dest = self.local.clone();
            tokio::task::spawn_blocking(move || archive::unpack_into(&bytes, &dest))
                .await
                .map_err(|e| FtError::Protocol(format!("extraction task failed: {}", e)))??;
            self.tasks.advance(&self.id, total);
            return Ok(());
        }

        let mut data = Vec::new();
        loop {
            let chunk = self
                .client
                .download(
                    &self.endpoint,
                    &self.remote,
                    data.len() as u64,
                    self.chunk_size as u64,
                )
                .await?;
            if data.is_empty() {
                self.tasks.set_total(&self.id, chunk.total_size, false);
            }
            let empty = chunk.bytes.is_empty();
            data.extend_from_slice(&chunk.bytes);
            self.tasks.advance(&self.id, data.len() as u64);
            if chunk.eof {
                break;
            }
            if empty {
                return Err(FtError::Protocol(format!(
                    "{} returned an empty chunk before end of file",
                    self.endpoint.machine
                )));
            }
        }

        if let Some(parent) = self.local.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FtError::io(parent, e))?;
        }
        tokio::fs::write(&self.local, &data)
            .await
            .map_err(|e| FtError::io(&self.local, e))?;
        Ok(())
    }
}

/// Quote a word for a POSIX shell
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
