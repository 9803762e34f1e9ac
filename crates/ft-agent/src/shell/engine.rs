//! Persistent shell plus a table of interactive processes

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

use ft_core::config::ShellConfig;
use ft_core::time::current_time_nanos;
use ft_core::{FtError, ProcessId, Result};

use super::process::{ProcessHandle, ProcessKind, ProcessStatus, SpawnSpec};

/// Result of a command run in the persistent shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellOutput {
    /// Lines printed before the completion marker, trimmed
    pub output: String,
    /// The marker never appeared; `output` is whatever had accumulated
    pub timed_out: bool,
}

/// Output collected from an interactive process since the last poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub id: ProcessId,
    pub output: String,
    pub status: ProcessStatus,
}

/// Summary of a live interactive process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub id: ProcessId,
    pub command: String,
    pub pid: Option<u32>,
    pub status: ProcessStatus,
}

/// Runs commands in a shell whose state persists across calls
pub struct ShellEngine {
    config: ShellConfig,
    /// Doubles as the exec lock: one command at a time in the shared shell
    persistent: tokio::sync::Mutex<Option<Arc<ProcessHandle>>>,
    processes: DashMap<ProcessId, Arc<ProcessHandle>>,
    next_id: AtomicU64,
}

impl ShellEngine {
    /// Create the engine and start the persistent shell
    pub async fn start(config: ShellConfig) -> Result<Self> {
        let engine = Self {
            config,
            persistent: tokio::sync::Mutex::new(None),
            processes: DashMap::new(),
            next_id: AtomicU64::new(1),
        };

        let shell = engine.spawn_persistent().await?;
        *engine.persistent.lock().await = Some(shell);
        Ok(engine)
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    fn allocate_id(&self) -> ProcessId {
        ProcessId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn spawn_persistent(&self) -> Result<Arc<ProcessHandle>> {
        let id = self.allocate_id();
        let shell = ProcessHandle::spawn(
            id,
            ProcessKind::Persistent,
            self.config.program.clone(),
            SpawnSpec {
                program: self.config.program.clone(),
                args: Vec::new(),
                working_dir: self.config.start_dir(),
                buffer_capacity: self.config.buffer_capacity,
            },
        )?;

        // Discard startup noise (motd, rc warnings)
        tokio::time::sleep(self.config.settle).await;
        shell.clear_output();

        Ok(shell)
    }

    /// Run `command` in the persistent shell and collect its output
    ///
    /// Waits for a unique marker echoed on the line after the command. If the marker
    /// does not show up within the poll budget the accumulated output is
    /// returned with `timed_out` set; the command keeps running.
    pub async fn run_in_persistent_shell(&self, command: &str) -> Result<ShellOutput> {
        let mut guard = self.persistent.lock().await;

        let shell = match guard.as_ref() {
            Some(shell) if !shell.has_exited() => Arc::clone(shell),
            _ => {
                tracing::warn!("Persistent shell is gone, starting a new one");
                let shell = self.spawn_persistent().await?;
                *guard = Some(Arc::clone(&shell));
                shell
            }
        };

        let marker = make_marker();
        shell.clear_output();
        // Newline rather than `;` so a trailing `&` or `# comment` in the
        // command cannot swallow the marker
        shell.write(&format!("{}\necho '{}'\n", command, marker)).await?;

        for _ in 0..self.config.max_polls {
            tokio::time::sleep(self.config.poll_interval).await;
            if let Some(lines) = shell.take_until(&marker) {
                tracing::debug!("Command finished: {}", command);
                return Ok(ShellOutput {
                    output: lines.join("\n").trim().to_string(),
                    timed_out: false,
                });
            }
        }

        let partial: Vec<String> = shell
            .drain_output()
            .into_iter()
            .filter(|line| !line.contains(&marker))
            .collect();
        tracing::warn!(
            "Command still running after {} polls, returning partial output: {}",
            self.config.max_polls,
            command
        );
        Ok(ShellOutput {
            output: partial.join("\n").trim().to_string(),
            timed_out: true,
        })
    }

    /// Working directory of the persistent shell
    pub async fn current_dir(&self) -> Result<String> {
        let result = self.run_in_persistent_shell("pwd").await?;
        result
            .output
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| FtError::Protocol("shell did not report a working directory".into()))
    }

    /// Start a standalone process for two-way interaction
    pub async fn start_interactive_process(&self, command: &str) -> Result<ProcessId> {
        let id = self.allocate_id();
        let handle = ProcessHandle::spawn(
            id,
            ProcessKind::Interactive,
            command.to_string(),
            SpawnSpec {
                program: self.config.program.clone(),
                args: vec!["-c".to_string(), command.to_string()],
                working_dir: self.config.start_dir(),
                buffer_capacity: self.config.buffer_capacity,
            },
        )?;
        self.processes.insert(id, handle);
        Ok(id)
    }

    fn process(&self, id: ProcessId) -> Result<Arc<ProcessHandle>> {
        self.processes
            .get(&id)
            .map(|r| Arc::clone(&r))
            .ok_or_else(|| FtError::not_found("process", id.to_string()))
    }

    /// Send a line of input to an interactive process
    pub async fn send_input(&self, id: ProcessId, input: &str) -> Result<()> {
        let handle = self.process(id)?;
        if input.ends_with('\n') {
            handle.write(input).await
        } else {
            handle.write(&format!("{}\n", input)).await
        }
    }

    /// Return and clear buffered output of an interactive process
    ///
    /// A process whose exit is reported here is removed from the table.
    pub async fn poll_output(&self, id: ProcessId) -> Result<ProcessOutput> {
        let handle = self.process(id)?;
        let status = handle.status();
        let output = handle.drain_output().join("\n");

        if matches!(status, ProcessStatus::Exited(_)) {
            self.processes.remove(&id);
        }

        Ok(ProcessOutput { id, output, status })
    }

    /// Terminate an interactive process
    pub async fn kill(&self, id: ProcessId) -> Result<()> {
        let (_, handle) = self
            .processes
            .remove(&id)
            .ok_or_else(|| FtError::not_found("process", id.to_string()))?;
        handle.kill();
        tracing::info!("Killed process {}", id);
        Ok(())
    }

    /// Live interactive processes
    pub fn list_processes(&self) -> Vec<ProcessInfo> {
        let mut list: Vec<ProcessInfo> = self
            .processes
            .iter()
            .map(|r| ProcessInfo {
                id: r.id,
                command: r.command.clone(),
                pid: r.pid,
                status: r.status(),
            })
            .collect();
        list.sort_by_key(|p| p.id);
        list
    }

    /// Kill every process including the persistent shell
    pub async fn shutdown(&self) {
        for entry in self.processes.iter() {
            entry.kill();
        }
        self.processes.clear();
        if let Some(shell) = self.persistent.lock().await.take() {
            shell.kill();
        }
    }
}

/// Marker unique enough that ordinary output will not contain it
fn make_marker() -> String {
    let salt: [u8; 4] = rand::thread_rng().gen();
    format!("__END_{}_{}__", current_time_nanos(), hex::encode(salt))
}
