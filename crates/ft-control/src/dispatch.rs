//! Tool-call dispatch
//!
//! A batch of typed tool calls goes through the approval gate, then the
//! approved calls run in order. The interrupt flag is checked before each
//! call; once raised, everything left in the batch reports `interrupted`.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ft_core::{FtError, MachineId, ProcessId, Result, SlotId, TaskId};

use crate::approval::{confirm_mutations, Classification, ConfirmReport, Decision, Prompter};
use crate::inspect::{self, LineRange};
use crate::interrupt::InterruptFlag;
use crate::registry::RegisterAgent;
use crate::state::ControlState;
use crate::sync::shell_quote;

/// One proposed tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(flatten)]
    pub action: ToolAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolAction {
    RunCommand {
        command: String,
        #[serde(default)]
        machine: Option<String>,
        /// Start a separate local process instead of using the shared shell
        #[serde(default)]
        interactive: bool,
    },
    SendInput {
        process: String,
        input: String,
    },
    PollOutput {
        process: String,
    },
    KillProcess {
        process: String,
    },
    EditFile {
        path: PathBuf,
        old: String,
        new: String,
    },
    DeleteFile {
        path: PathBuf,
    },
    RenameSymbol {
        path: PathBuf,
        old: String,
        new: String,
    },
    ReadFile {
        path: String,
        #[serde(default)]
        machine: Option<String>,
        #[serde(default)]
        start_line: Option<usize>,
        #[serde(default)]
        end_line: Option<usize>,
    },
    ListDirectory {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        machine: Option<String>,
    },
    SyncPush {
        machine: String,
        local: PathBuf,
        remote: String,
    },
    SyncPull {
        machine: String,
        remote: String,
        local: PathBuf,
    },
    SyncStatus {
        task: String,
    },
    OpenSlot {
        slot: SlotId,
        machine: String,
    },
    CloseSlot {
        slot: SlotId,
    },
    SwitchSlot {
        slot: SlotId,
        machine: String,
    },
    Snapshot {
        #[serde(default)]
        slot: Option<SlotId>,
    },
    ListMachines,
    RegisterAgent {
        host: String,
        user: String,
        credential: String,
        alias: String,
    },
    GitCommit {
        message: String,
        #[serde(default)]
        machine: Option<String>,
    },
}

impl ToolAction {
    /// Command line for calls that run one
    pub fn command_text(&self) -> Option<&str> {
        match self {
            ToolAction::RunCommand { command, .. } => Some(command),
            _ => None,
        }
    }

    /// One-line description for approval prompts
    pub fn describe(&self) -> String {
        match self {
            ToolAction::RunCommand {
                command,
                machine,
                interactive,
            } => {
                let target = machine.as_deref().unwrap_or("current machine");
                if *interactive {
                    format!("start `{}` as an interactive process", command)
                } else {
                    format!("run `{}` on {}", command, target)
                }
            }
            ToolAction::SendInput { process, input } => {
                format!("send {:?} to {}", input, process)
            }
            ToolAction::PollOutput { process } => format!("read output of {}", process),
            ToolAction::KillProcess { process } => format!("kill {}", process),
            ToolAction::EditFile { path, .. } => format!("edit {}", path.display()),
            ToolAction::DeleteFile { path } => format!("delete {}", path.display()),
            ToolAction::RenameSymbol { path, old, new } => {
                format!("rename {} to {} in {}", old, new, path.display())
            }
            ToolAction::ReadFile { path, .. } => format!("read {}", path),
            ToolAction::ListDirectory { path, .. } => {
                format!("list {}", path.as_deref().unwrap_or("working directory"))
            }
            ToolAction::SyncPush {
                machine,
                local,
                remote,
            } => format!("push {} to {}:{}", local.display(), machine, remote),
            ToolAction::SyncPull {
                machine,
                remote,
                local,
            } => format!("pull {}:{} to {}", machine, remote, local.display()),
            ToolAction::SyncStatus { task } => format!("check task {}", task),
            ToolAction::OpenSlot { slot, machine } => format!("open {} on {}", slot, machine),
            ToolAction::CloseSlot { slot } => format!("close {}", slot),
            ToolAction::SwitchSlot { slot, machine } => {
                format!("switch {} to {}", slot, machine)
            }
            ToolAction::Snapshot { .. } => "show terminal snapshot".to_string(),
            ToolAction::ListMachines => "list machines".to_string(),
            ToolAction::RegisterAgent {
                host, user, alias, ..
            } => format!("install an agent on {}@{} as {}", user, host, alias),
            ToolAction::GitCommit { message, machine } => format!(
                "git commit -m {:?} on {}",
                message,
                machine.as_deref().unwrap_or("current machine")
            ),
        }
    }
}

/// What happened to one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Ok(String),
    Error(String),
    /// The operator said no
    Denied,
    /// Denylisted; carries the command
    Rejected(String),
    /// Skipped because the interrupt flag was raised
    Interrupted,
}

impl fmt::Display for ToolOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolOutcome::Ok(text) => write!(f, "{}", text),
            ToolOutcome::Error(message) => write!(f, "error: {}", message),
            ToolOutcome::Denied => write!(f, "user denied"),
            ToolOutcome::Rejected(command) => write!(
                f,
                "rejected: `{}` needs a full-screen terminal and cannot run here",
                command
            ),
            ToolOutcome::Interrupted => write!(f, "interrupted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub call_id: String,
    pub outcome: ToolOutcome,
}

impl fmt::Display for ToolResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.call_id, self.outcome)
    }
}

pub struct ToolDispatcher {
    state: Arc<ControlState>,
    prompter: Arc<dyn Prompter>,
    interrupt: InterruptFlag,
}

impl ToolDispatcher {
    pub fn new(state: Arc<ControlState>, prompter: Arc<dyn Prompter>, interrupt: InterruptFlag) -> Self {
        Self {
            state,
            prompter,
            interrupt,
        }
    }

    pub fn state(&self) -> &Arc<ControlState> {
        &self.state
    }

    /// Approve and run a batch; results come back in input order
    pub async fn run_batch(&self, calls: Vec<ToolCall>) -> Result<Vec<ToolResult>> {
        self.interrupt.clear();
        let classification = self.state.gate.classify(&calls);
        let mut outcomes: Vec<Option<ToolOutcome>> = vec![None; calls.len()];

        for denied in &classification.denied {
            tracing::info!("Rejected {} ({}): matches {}", denied.call_id, denied.command, denied.matched);
            outcomes[denied.index] = Some(ToolOutcome::Rejected(denied.command.clone()));
        }

        if classification.needs_decision() {
            let question = approval_question(&calls, &classification);
            let answer = self.prompter.ask(&question).await?;
            let decision = Decision::parse(&answer, classification.pending.len());
            for (n, &index) in classification.pending.iter().enumerate() {
                if !decision.approves(n + 1) {
                    tracing::debug!("Operator denied {}", calls[index].id);
                    outcomes[index] = Some(ToolOutcome::Denied);
                }
            }
        }

        let mut results = Vec::with_capacity(calls.len());
        for (call, outcome) in calls.iter().zip(outcomes) {
            let outcome = match outcome {
                Some(decided) => decided,
                None if self.interrupt.is_raised() => ToolOutcome::Interrupted,
                None => match self.execute(call).await {
                    Ok(text) => ToolOutcome::Ok(text),
                    Err(e) => {
                        tracing::debug!("Call {} failed: {}", call.id, e);
                        ToolOutcome::Error(e.to_string())
                    }
                },
            };
            results.push(ToolResult {
                call_id: call.id.clone(),
                outcome,
            });
        }

        if self.interrupt.take() {
            tracing::info!("Batch interrupted by operator");
        }
        Ok(results)
    }

    /// Offer to undo file changes made during the turn
    pub async fn confirm_turn(&self) -> Result<ConfirmReport> {
        confirm_mutations(&self.state.ledger, self.prompter.as_ref()).await
    }

    async fn execute(&self, call: &ToolCall) -> Result<String> {
        let state = &self.state;
        match &call.action {
            ToolAction::RunCommand {
                command,
                machine,
                interactive: true,
            } => {
                if machine.as_deref().is_some_and(|m| !MachineId::new(m).is_local()) {
                    return Err(FtError::Validation(
                        "interactive processes only run on the local machine".to_string(),
                    ));
                }
                let id = state.shell.start_interactive_process(command).await?;
                Ok(format!("started {}; use poll_output to read from it", id))
            }
            ToolAction::RunCommand {
                command, machine, ..
            } => {
                let target = state.registry.route(machine.as_deref())?;
                let out = state.registry.execute(&target, command).await?;
                Ok(command_reply(out.output, out.timed_out))
            }
            ToolAction::SendInput { process, input } => {
                let id: ProcessId = process.parse()?;
                state.shell.send_input(id, input).await?;
                Ok(format!("sent input to {}", id))
            }
            ToolAction::PollOutput { process } => {
                let out = state.shell.poll_output(process.parse()?).await?;
                let body = if out.output.is_empty() {
                    "(no new output)".to_string()
                } else {
                    out.output
                };
                Ok(format!("{}\n[{}: {}]", body, out.id, out.status))
            }
            ToolAction::KillProcess { process } => {
                let id: ProcessId = process.parse()?;
                state.shell.kill(id).await?;
                Ok(format!("killed {}", id))
            }
            ToolAction::EditFile { path, old, new } => state
                .editor
                .replace_once(&call.id, path, old, new)
                .map(|r| r.to_string()),
            ToolAction::DeleteFile { path } => {
                state.editor.delete(&call.id, path).map(|r| r.to_string())
            }
            ToolAction::RenameSymbol { path, old, new } => state
                .editor
                .rename_symbol(&call.id, path, old, new)
                .map(|r| r.to_string()),
            ToolAction::ReadFile {
                path,
                machine,
                start_line,
                end_line,
            } => {
                inspect::read_file(
                    &state.registry,
                    &state.client,
                    machine.as_deref(),
                    path,
                    LineRange::new(*start_line, *end_line),
                )
                .await
            }
            ToolAction::ListDirectory { path, machine } => {
                inspect::list_directory(
                    &state.registry,
                    &state.client,
                    machine.as_deref(),
                    path.as_deref(),
                )
                .await
            }
            ToolAction::SyncPush {
                machine,
                local,
                remote,
            } => state
                .sync
                .push(&MachineId::new(machine.as_str()), local, remote)
                .await
                .map(|r| r.to_string()),
            ToolAction::SyncPull {
                machine,
                remote,
                local,
            } => state
                .sync
                .pull(&MachineId::new(machine.as_str()), remote, local)
                .await
                .map(|r| r.to_string()),
            ToolAction::SyncStatus { task } => state
                .sync
                .status(&TaskId::from(task.as_str()))
                .map(|s| s.to_string()),
            ToolAction::OpenSlot { slot, machine } => {
                state.registry.open_slot(*slot, &MachineId::new(machine.as_str()))?;
                Ok(format!("opened {} on {}", slot, machine))
            }
            ToolAction::CloseSlot { slot } => {
                state.registry.close_slot(*slot)?;
                Ok(format!("closed {}", slot))
            }
            ToolAction::SwitchSlot { slot, machine } => {
                state.registry.switch_slot(*slot, &MachineId::new(machine.as_str()))?;
                Ok(format!("switched {} to {}", slot, machine))
            }
            ToolAction::Snapshot { slot } => Ok(state.registry.snapshot(*slot)),
            ToolAction::ListMachines => Ok(self.machine_table()),
            ToolAction::RegisterAgent {
                host,
                user,
                credential,
                alias,
            } => {
                let machine = state
                    .registry
                    .register_agent(RegisterAgent {
                        host: host.clone(),
                        user: user.clone(),
                        credential: credential.clone(),
                        alias: alias.clone(),
                    })
                    .await?;
                Ok(format!("registered {} at {}", machine.id, machine.address()))
            }
            ToolAction::GitCommit { message, machine } => {
                let target = state.registry.route(machine.as_deref())?;
                let command = format!("git add -A && git commit -m {}", shell_quote(message));
                let out = state.registry.execute(&target, &command).await?;
                Ok(command_reply(out.output, out.timed_out))
            }
        }
    }

    fn machine_table(&self) -> String {
        let registry = &self.state.registry;
        let bound: Vec<(SlotId, MachineId)> = SlotId::ALL
            .iter()
            .filter_map(|s| registry.slot_binding(*s).map(|m| (*s, m)))
            .collect();

        registry
            .list_machines()
            .iter()
            .map(|m| {
                let slots: Vec<String> = bound
                    .iter()
                    .filter(|(_, id)| id == &m.id)
                    .map(|(s, _)| s.to_string())
                    .collect();
                let mut line = format!("{}\t{}\t{}\t{}", m.id, m.kind, m.address(), m.description);
                if !slots.is_empty() {
                    line.push_str(&format!("\t[{}]", slots.join(", ")));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn command_reply(output: String, timed_out: bool) -> String {
    let mut reply = if output.is_empty() {
        "(no output)".to_string()
    } else {
        output
    };
    if timed_out {
        reply.push_str("\n(command still running; output so far)");
    }
    reply
}

fn approval_question(calls: &[ToolCall], classification: &Classification) -> String {
    let mut question = String::new();
    if !classification.denied.is_empty() {
        question.push_str("Rejected, will not run:\n");
        for denied in &classification.denied {
            question.push_str(&format!("  - {}\n", calls[denied.index].action.describe()));
        }
    }
    question.push_str("Approval needed:\n");
    for (n, &index) in classification.pending.iter().enumerate() {
        question.push_str(&format!("  {}. {}\n", n + 1, calls[index].action.describe()));
    }
    question.push_str("[y = approve all, n = deny all, y <n,...> = approve only, n <n,...> = deny only]");
    question
}
