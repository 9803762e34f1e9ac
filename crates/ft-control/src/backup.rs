//! Backup ledger
//!
//! Holds the pre-image of every file mutated during the current unit of
//! work. The first mutation of a path stores its bytes; later mutations of
//! the same path only bump the edit count, so an undo always goes back to
//! the state before the first change.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use ft_core::{FtError, Result};

/// What a mutation did to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Edit,
    Rename,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Edit => write!(f, "edit"),
            MutationKind::Rename => write!(f, "rename"),
            MutationKind::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug)]
struct BackupEntry {
    call_id: String,
    kind: MutationKind,
    path: PathBuf,
    original: Vec<u8>,
    edit_count: u32,
    aliases: Vec<String>,
}

impl BackupEntry {
    fn answers_to(&self, call_id: &str) -> bool {
        self.call_id == call_id || self.aliases.iter().any(|a| a == call_id)
    }

    fn info(&self) -> BackupInfo {
        BackupInfo {
            call_id: self.call_id.clone(),
            kind: self.kind,
            path: self.path.clone(),
            edit_count: self.edit_count,
            size: self.original.len() as u64,
        }
    }
}

/// Read-only view of a ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub call_id: String,
    pub kind: MutationKind,
    pub path: PathBuf,
    pub edit_count: u32,
    /// Size of the stored pre-image
    pub size: u64,
}

impl fmt::Display for BackupInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.call_id, self.kind, self.path.display())?;
        if self.edit_count > 1 {
            write!(f, " ({} edits)", self.edit_count)?;
        }
        Ok(())
    }
}

/// What an undo put back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoReport {
    pub path: PathBuf,
    pub kind: MutationKind,
    pub edit_count: u32,
}

impl fmt::Display for UndoReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "restored {}", self.path.display())?;
        match self.edit_count {
            1 => write!(f, " (undid 1 {})", self.kind),
            n => write!(f, " (undid {} changes)", n),
        }
    }
}

/// Pre-images of mutated files, in the order they were first touched
#[derive(Debug, Default)]
pub struct BackupLedger {
    entries: Mutex<Vec<BackupEntry>>,
}

impl BackupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<BackupEntry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Remember `original` as the pre-image of `path` unless one is held
    pub fn record(&self, call_id: &str, kind: MutationKind, path: &Path, original: Vec<u8>) {
        let mut entries = self.lock();
        if let Some(entry) = entries.iter_mut().find(|e| e.path == path) {
            entry.edit_count += 1;
            entry.kind = kind;
            if !entry.answers_to(call_id) {
                entry.aliases.push(call_id.to_string());
            }
            tracing::debug!(
                "Backup for {} already held, edit count now {}",
                path.display(),
                entry.edit_count
            );
            return;
        }

        tracing::debug!("Backed up {} before {} ({})", path.display(), kind, call_id);
        entries.push(BackupEntry {
            call_id: call_id.to_string(),
            kind,
            path: path.to_path_buf(),
            original,
            edit_count: 1,
            aliases: Vec::new(),
        });
    }

    /// Put a file back the way it was before its first mutation
    pub fn undo(&self, call_id: &str) -> Result<UndoReport> {
        // Writing happens under the lock so a concurrent record cannot slip
        // a second pre-image in between restore and removal.
        let mut entries = self.lock();
        let pos = entries
            .iter()
            .position(|e| e.answers_to(call_id))
            .ok_or_else(|| FtError::not_found("backup", call_id))?;

        let entry = &entries[pos];
        restore(&entry.path, &entry.original)?;

        let entry = entries.remove(pos);
        tracing::info!("Restored {} from backup {}", entry.path.display(), entry.call_id);
        Ok(UndoReport {
            path: entry.path,
            kind: entry.kind,
            edit_count: entry.edit_count,
        })
    }

    /// Accept one mutation, dropping its pre-image
    pub fn commit(&self, call_id: &str) -> bool {
        let mut entries = self.lock();
        match entries.iter().position(|e| e.answers_to(call_id)) {
            Some(pos) => {
                entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Accept every pending mutation; returns how many were dropped
    pub fn commit_all(&self) -> usize {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        if count > 0 {
            tracing::info!("Committed {} backed-up change(s)", count);
        }
        count
    }

    pub fn list(&self) -> Vec<BackupInfo> {
        self.lock().iter().map(BackupEntry::info).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn restore(path: &Path, original: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| FtError::io(parent, e))?;
    }
    std::fs::write(path, original).map_err(|e| FtError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_first_pre_image_wins() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "v1").unwrap();

        let ledger = BackupLedger::new();
        ledger.record("c1", MutationKind::Edit, &path, b"v1".to_vec());
        std::fs::write(&path, "v2").unwrap();
        ledger.record("c2", MutationKind::Edit, &path, b"v2".to_vec());
        std::fs::write(&path, "v3").unwrap();

        let list = ledger.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].edit_count, 2);
        assert_eq!(list[0].size, 2);

        // The later call id resolves to the same entry
        let report = ledger.undo("c2").unwrap();
        assert_eq!(report.edit_count, 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "v1");
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_undo_delete_recreates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deep/b.txt");

        let ledger = BackupLedger::new();
        ledger.record("d1", MutationKind::Delete, &path, b"gone".to_vec());

        let report = ledger.undo("d1").unwrap();
        assert_eq!(report.kind, MutationKind::Delete);
        assert_eq!(std::fs::read(&path).unwrap(), b"gone");
    }

    #[test]
    fn test_undo_unknown_id() {
        let ledger = BackupLedger::new();
        assert!(ledger.undo("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_failed_restore_keeps_entry() {
        let dir = tempdir().unwrap();
        // A regular file standing where the parent directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let path = blocker.join("c.txt");

        let ledger = BackupLedger::new();
        ledger.record("e1", MutationKind::Edit, &path, b"data".to_vec());

        let err = ledger.undo("e1").unwrap_err();
        assert!(err.to_string().contains("blocker"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_commit_and_list_order() {
        let ledger = BackupLedger::new();
        ledger.record("c1", MutationKind::Edit, Path::new("/tmp/one"), vec![]);
        ledger.record("c2", MutationKind::Rename, Path::new("/tmp/two"), vec![]);
        ledger.record("c3", MutationKind::Delete, Path::new("/tmp/three"), vec![]);

        let ids: Vec<_> = ledger.list().into_iter().map(|b| b.call_id).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);

        assert!(ledger.commit("c2"));
        assert!(!ledger.commit("c2"));
        assert_eq!(ledger.commit_all(), 2);
        assert!(ledger.list().is_empty());
        assert_eq!(ledger.commit_all(), 0);
    }
}
