//! Batch classification
//!
//! Denylisted commands are rejected outright, allowlisted commands and
//! reversible or read-only tools run without asking, and everything else
//! waits for an operator decision.

use ft_core::config::ApprovalConfig;

use crate::dispatch::{ToolAction, ToolCall};

/// Tokens that chain or redirect commands; their presence disables the allowlist
const CONTROL_OPERATORS: &[&str] = &[";", "&&", "||", "|", "`", "$(", ">", "<", "\n"];

/// How a single call is treated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Never runs; carries the denylist entry that matched
    Denied(String),
    AutoApproved,
    Pending,
}

/// A call rejected by the denylist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeniedCall {
    /// Position in the batch
    pub index: usize,
    pub call_id: String,
    pub command: String,
    pub matched: String,
}

/// A batch split three ways; every list holds batch positions in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub denied: Vec<DeniedCall>,
    pub auto_approved: Vec<usize>,
    pub pending: Vec<usize>,
}

impl Classification {
    pub fn needs_decision(&self) -> bool {
        !self.pending.is_empty()
    }
}

pub struct ApprovalGate {
    allowlist: Vec<String>,
    denylist: Vec<String>,
}

impl ApprovalGate {
    pub fn new(config: &ApprovalConfig) -> Self {
        let normalize = |list: &[String]| {
            list.iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            allowlist: normalize(&config.allowlist),
            denylist: normalize(&config.denylist),
        }
    }

    pub fn classify(&self, calls: &[ToolCall]) -> Classification {
        let mut out = Classification::default();
        for (index, call) in calls.iter().enumerate() {
            match self.verdict(&call.action) {
                Verdict::Denied(matched) => out.denied.push(DeniedCall {
                    index,
                    call_id: call.id.clone(),
                    command: call.action.command_text().unwrap_or_default().to_string(),
                    matched,
                }),
                Verdict::AutoApproved => out.auto_approved.push(index),
                Verdict::Pending => out.pending.push(index),
            }
        }
        out
    }

    pub fn verdict(&self, action: &ToolAction) -> Verdict {
        match action {
            ToolAction::RunCommand { command, .. } => self.check_command(command),
            ToolAction::KillProcess { .. }
            | ToolAction::GitCommit { .. }
            | ToolAction::RegisterAgent { .. } => Verdict::Pending,
            _ => Verdict::AutoApproved,
        }
    }

    /// Classify a raw command line
    pub fn check_command(&self, command: &str) -> Verdict {
        let lowered = command.trim().to_lowercase();

        for segment in segments(&lowered) {
            if let Some(entry) = self.denylist.iter().find(|e| starts_with_word(segment, e)) {
                return Verdict::Denied(entry.clone());
            }
        }

        let chained = CONTROL_OPERATORS.iter().any(|op| lowered.contains(op));
        if !chained && self.allowlist.iter().any(|e| starts_with_word(&lowered, e)) {
            return Verdict::AutoApproved;
        }
        Verdict::Pending
    }
}

/// Split a command line on chaining operators
fn segments(command: &str) -> impl Iterator<Item = &str> {
    command
        .split(|c| matches!(c, ';' | '&' | '|' | '\n' | '(' | '`'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// `command` is `entry`, or `entry` followed by whitespace
fn starts_with_word(command: &str, entry: &str) -> bool {
    match command.strip_prefix(entry) {
        Some(rest) => rest.is_empty() || rest.starts_with(char::is_whitespace),
        None => false,
    }
}
