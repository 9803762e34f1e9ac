//! File mutations that go through the backup ledger
//!
//! Each operation reads the current bytes, applies its change, and only on
//! success records the pre-image and writes the result.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use regex::Regex;

use ft_core::{FtError, Result};

use crate::backup::{BackupLedger, MutationKind};

/// Outcome of a successful mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReport {
    pub path: PathBuf,
    pub kind: MutationKind,
    /// Replacements made; zero for deletes
    pub replacements: usize,
}

impl std::fmt::Display for MutationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            MutationKind::Edit => write!(f, "edited {}", self.path.display()),
            MutationKind::Delete => write!(f, "deleted {}", self.path.display()),
            MutationKind::Rename => write!(
                f,
                "renamed {} occurrence(s) in {}",
                self.replacements,
                self.path.display()
            ),
        }
    }
}

/// Applies edits, deletes and symbol renames with backups
pub struct FileEditor {
    ledger: Arc<BackupLedger>,
}

impl FileEditor {
    pub fn new(ledger: Arc<BackupLedger>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<BackupLedger> {
        &self.ledger
    }

    /// Replace the single occurrence of `old` with `new`
    pub fn replace_once(
        &self,
        call_id: &str,
        path: &Path,
        old: &str,
        new: &str,
    ) -> Result<MutationReport> {
        if old.is_empty() {
            return Err(FtError::Validation(format!(
                "edit of {} needs non-empty text to replace",
                path.display()
            )));
        }

        let (bytes, text) = read_text(path)?;
        let count = text.matches(old).count();
        if count != 1 {
            return Err(FtError::Conflict {
                path: path.to_path_buf(),
                count,
            });
        }

        let updated = text.replacen(old, new, 1);
        self.ledger
            .record(call_id, MutationKind::Edit, &ledger_key(path), bytes);
        write(path, updated.as_bytes())?;

        tracing::debug!("Edited {}", path.display());
        Ok(MutationReport {
            path: path.to_path_buf(),
            kind: MutationKind::Edit,
            replacements: 1,
        })
    }

    /// Remove a file, keeping its bytes for undo
    pub fn delete(&self, call_id: &str, path: &Path) -> Result<MutationReport> {
        let key = ledger_key(path);
        let bytes = std::fs::read(path).map_err(|e| FtError::io(path, e))?;
        std::fs::remove_file(path).map_err(|e| FtError::io(path, e))?;
        self.ledger.record(call_id, MutationKind::Delete, &key, bytes);

        tracing::debug!("Deleted {}", path.display());
        Ok(MutationReport {
            path: path.to_path_buf(),
            kind: MutationKind::Delete,
            replacements: 0,
        })
    }

    /// Replace every whole-word occurrence of identifier `old` with `new`
    pub fn rename_symbol(
        &self,
        call_id: &str,
        path: &Path,
        old: &str,
        new: &str,
    ) -> Result<MutationReport> {
        validate_identifier(old)?;
        validate_identifier(new)?;

        let (bytes, text) = read_text(path)?;
        let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(old)))
            .map_err(|e| FtError::Validation(format!("bad symbol {:?}: {}", old, e)))?;

        let replacements = pattern.find_iter(&text).count();
        if replacements == 0 {
            return Err(FtError::not_found(
                "symbol",
                format!("{} in {}", old, path.display()),
            ));
        }

        let updated = pattern.replace_all(&text, regex::NoExpand(new));
        self.ledger
            .record(call_id, MutationKind::Rename, &ledger_key(path), bytes);
        write(path, updated.as_bytes())?;

        tracing::debug!(
            "Renamed {} -> {} ({} occurrences) in {}",
            old,
            new,
            replacements,
            path.display()
        );
        Ok(MutationReport {
            path: path.to_path_buf(),
            kind: MutationKind::Rename,
            replacements,
        })
    }
}

/// One spelling per file, so the ledger never holds two pre-images for it
fn ledger_key(path: &Path) -> PathBuf {
    if let Ok(real) = std::fs::canonicalize(path) {
        return real;
    }
    // Missing file: resolve the parent and keep the name
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(real) = std::fs::canonicalize(parent) {
            return real.join(name);
        }
    }
    lexical_absolute(path)
}

fn lexical_absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn read_text(path: &Path) -> Result<(Vec<u8>, String)> {
    let bytes = std::fs::read(path).map_err(|e| FtError::io(path, e))?;
    let text = String::from_utf8(bytes.clone()).map_err(|_| {
        FtError::Validation(format!("{} is not valid UTF-8 text", path.display()))
    })?;
    Ok((bytes, text))
}

fn write(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| FtError::io(path, e))
}

fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {
            chars.all(|c| c == '_' || c.is_alphanumeric())
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(FtError::Validation(format!(
            "{:?} is not a valid identifier",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn editor() -> FileEditor {
        FileEditor::new(Arc::new(BackupLedger::new()))
    }

    #[test]
    fn test_replace_once_requires_single_match() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("main.rs");
        std::fs::write(&path, "foo bar foo").unwrap();
        let editor = editor();

        match editor.replace_once("c1", &path, "foo", "baz") {
            Err(FtError::Conflict { count, .. }) => assert_eq!(count, 2),
            other => panic!("expected conflict, got {:?}", other),
        }
        match editor.replace_once("c1", &path, "qux", "baz") {
            Err(FtError::Conflict { count, .. }) => assert_eq!(count, 0),
            other => panic!("expected conflict, got {:?}", other),
        }
        assert!(editor.ledger().is_empty());

        editor.replace_once("c2", &path, "bar", "BAR").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "foo BAR foo");
        assert_eq!(editor.ledger().len(), 1);
    }

    #[test]
    fn test_two_spellings_share_one_backup() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let path = dir.path().join("a.txt");
        let detour = dir.path().join("sub/../a.txt");
        std::fs::write(&path, "v1").unwrap();
        let editor = editor();

        editor.replace_once("c1", &path, "v1", "v2").unwrap();
        editor.replace_once("c2", &detour, "v2", "v3").unwrap();

        let backups = editor.ledger().list();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].edit_count, 2);

        for backup in backups {
            editor.ledger().undo(&backup.call_id).unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "v1");
    }

    #[test]
    fn test_delete_after_edit_keeps_first_pre_image() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.txt");
        std::fs::write(&path, "first").unwrap();
        let editor = editor();

        editor.replace_once("e1", &path, "first", "second").unwrap();
        editor.delete("d1", &dir.path().join(".").join("b.txt")).unwrap();
        assert_eq!(editor.ledger().len(), 1);

        editor.ledger().undo("d1").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first");
    }

    #[test]
    fn test_lexical_absolute_collapses_dots() {
        assert_eq!(
            lexical_absolute(Path::new("/srv/app/./src/../lib.rs")),
            PathBuf::from("/srv/app/lib.rs")
        );
        assert!(lexical_absolute(Path::new("x/../y.txt")).is_absolute());
    }

    #[test]
    fn test_replace_once_rejects_empty_old() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.txt");
        std::fs::write(&path, "abc").unwrap();

        let err = editor().replace_once("c1", &path, "", "z").unwrap_err();
        assert!(matches!(err, FtError::Validation(_)));
    }

    #[test]
    fn test_conflict_message_names_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("named.txt");
        std::fs::write(&path, "aaa").unwrap();

        let err = editor().replace_once("c1", &path, "a", "b").unwrap_err();
        assert!(err.to_string().contains("named.txt"));
        assert!(err.to_string().contains("found 3"));
    }

    #[test]
    fn test_delete_then_undo() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        std::fs::write(&path, "keep me").unwrap();
        let editor = editor();

        editor.delete("d1", &path).unwrap();
        assert!(!path.exists());

        editor.ledger().undo("d1").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[test]
    fn test_rename_symbol_whole_words() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lib.rs");
        std::fs::write(&path, "let count = count_all(count);\n").unwrap();
        let editor = editor();

        let report = editor.rename_symbol("r1", &path, "count", "total").unwrap();
        assert_eq!(report.replacements, 2);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "let total = count_all(total);\n"
        );
    }

    #[test]
    fn test_rename_symbol_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lib.rs");
        std::fs::write(&path, "fn main() {}\n").unwrap();
        let editor = editor();

        assert!(editor
            .rename_symbol("r1", &path, "missing", "found")
            .unwrap_err()
            .is_not_found());
        assert!(matches!(
            editor.rename_symbol("r1", &path, "main", "not valid"),
            Err(FtError::Validation(_))
        ));
        assert!(editor.ledger().is_empty());
    }
}
