//! A spawned process with piped I/O and background output readers

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio_util::sync::CancellationToken;

use ft_core::{FtError, ProcessId, Result};

use super::buffer::OutputBuffer;

/// How long the exit watcher waits for readers to drain after exit
const READER_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Which role a process plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessKind {
    /// The shared long-lived shell commands are typed into
    Persistent,
    /// A standalone subprocess driven by send_input/poll_output
    Interactive,
}

/// Lifecycle of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "code", rename_all = "lowercase")]
pub enum ProcessStatus {
    Running,
    Exited(Option<i32>),
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessStatus::Running => write!(f, "running"),
            ProcessStatus::Exited(Some(code)) => write!(f, "exited({})", code),
            ProcessStatus::Exited(None) => write!(f, "exited(signal)"),
        }
    }
}

/// What to spawn
pub(crate) struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub buffer_capacity: usize,
}

/// Handle to a running (or finished) process
pub struct ProcessHandle {
    pub id: ProcessId,
    pub kind: ProcessKind,
    /// Command line the process was started with
    pub command: String,
    /// OS process id, if the platform reported one
    pub pid: Option<u32>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    output: Arc<Mutex<OutputBuffer>>,
    kill: CancellationToken,
}

impl ProcessHandle {
    /// Spawn the process and start its reader and exit-watcher tasks
    pub(crate) fn spawn(
        id: ProcessId,
        kind: ProcessKind,
        command: String,
        spec: SpawnSpec,
    ) -> Result<Arc<Self>> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| FtError::io(&spec.program, e))?;
        let pid = child.id();

        let output = Arc::new(Mutex::new(OutputBuffer::new(spec.buffer_capacity)));
        let kill = CancellationToken::new();

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump_lines(stdout, Arc::clone(&output))));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump_lines(stderr, Arc::clone(&output))));
        }
        let stdin = child.stdin.take();

        let watcher_output = Arc::clone(&output);
        let watcher_kill = kill.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = watcher_kill.cancelled() => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };

            for reader in readers {
                let _ = tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await;
            }

            let code = status.ok().and_then(|s| s.code());
            tracing::debug!("Process {} exited with {:?}", id, code);
            lock(&watcher_output).set_exit(code);
        });

        tracing::info!("Spawned {:?} process {} (pid {:?}): {}", kind, id, pid, command);

        Ok(Arc::new(Self {
            id,
            kind,
            command,
            pid,
            stdin: tokio::sync::Mutex::new(stdin),
            output,
            kill,
        }))
    }

    /// Current lifecycle state
    pub fn status(&self) -> ProcessStatus {
        match lock(&self.output).exit() {
            None => ProcessStatus::Running,
            Some(code) => ProcessStatus::Exited(code),
        }
    }

    pub fn has_exited(&self) -> bool {
        matches!(self.status(), ProcessStatus::Exited(_))
    }

    /// Write raw text to the process's stdin
    pub async fn write(&self, text: &str) -> Result<()> {
        if self.has_exited() {
            return Err(FtError::Validation(format!("process {} has exited", self.id)));
        }

        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| FtError::Validation(format!("process {} has no stdin", self.id)))?;

        let result = async {
            stdin.write_all(text.as_bytes()).await?;
            stdin.flush().await
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                *guard = None;
                Err(FtError::Validation(format!("process {} has exited", self.id)))
            }
            Err(e) => Err(FtError::io(format!("stdin of {}", self.id), e)),
        }
    }

    pub(crate) fn clear_output(&self) {
        lock(&self.output).clear();
    }

    pub(crate) fn drain_output(&self) -> Vec<String> {
        lock(&self.output).drain()
    }

    pub(crate) fn take_until(&self, marker: &str) -> Option<Vec<String>> {
        lock(&self.output).take_until(marker)
    }

    /// Request termination; the exit watcher reaps the process
    pub fn kill(&self) {
        self.kill.cancel();
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.kill.cancel();
    }
}

/// Lock a buffer, recovering from a poisoned lock
fn lock(output: &Mutex<OutputBuffer>) -> MutexGuard<'_, OutputBuffer> {
    output.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Copy lines from a pipe into the shared buffer until EOF
async fn pump_lines<R>(reader: R, output: Arc<Mutex<OutputBuffer>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                lock(&output).push(line);
            }
            Err(e) => {
                tracing::debug!("Output reader stopped: {}", e);
                break;
            }
        }
    }
}
