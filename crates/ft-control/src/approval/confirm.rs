//! Post-turn confirmation of applied file mutations

use std::fmt;

use ft_core::Result;

use crate::backup::{BackupLedger, UndoReport};

use super::{Decision, Prompter};

/// What the confirmation pass did
#[derive(Debug, Default)]
pub struct ConfirmReport {
    pub committed: usize,
    pub undone: Vec<UndoReport>,
    /// Entries whose restore failed; they stay in the ledger
    pub failed: Vec<String>,
}

impl fmt::Display for ConfirmReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kept {} change(s), undid {}",
            self.committed,
            self.undone.len()
        )?;
        for undo in &self.undone {
            write!(f, "\n  {}", undo)?;
        }
        for failure in &self.failed {
            write!(f, "\n  undo failed: {}", failure)?;
        }
        Ok(())
    }
}

/// Ask which of the ledger's mutations to keep
///
/// Uses the same grammar as the approval prompt, numbered over ledger order:
/// approved entries are committed, the rest are undone.
pub async fn confirm_mutations(
    ledger: &BackupLedger,
    prompter: &dyn Prompter,
) -> Result<ConfirmReport> {
    let entries = ledger.list();
    if entries.is_empty() {
        return Ok(ConfirmReport::default());
    }

    let mut question = String::from("Keep these file changes?");
    for (i, entry) in entries.iter().enumerate() {
        question.push_str(&format!("\n  {}. {}", i + 1, entry));
    }
    question.push_str("\n[y = keep all, n = undo all, y <n,...> = keep only, n <n,...> = undo only]");

    let answer = prompter.ask(&question).await?;
    let decision = Decision::parse(&answer, entries.len());

    let mut report = ConfirmReport::default();
    for (i, entry) in entries.iter().enumerate() {
        if decision.approves(i + 1) {
            if ledger.commit(&entry.call_id) {
                report.committed += 1;
            }
            continue;
        }
        match ledger.undo(&entry.call_id) {
            Ok(undo) => report.undone.push(undo),
            Err(e) => {
                tracing::warn!("Undo of {} failed: {}", entry.path.display(), e);
                report.failed.push(e.to_string());
            }
        }
    }
    Ok(report)
}
