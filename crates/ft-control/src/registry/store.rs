//! Registry file persistence
//!
//! The registry is stored as a JSON document of machines and slot
//! bindings. Volatile fields (working directories, transcripts) are not
//! persisted. Writes go to a temporary file that is then renamed over the
//! original so a crash never leaves a half-written registry.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ft_core::{FtError, Machine, MachineId, Result};

/// Persisted slot bindings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotBindings {
    pub slot1: MachineId,
    #[serde(default)]
    pub slot2: Option<MachineId>,
}

impl Default for SlotBindings {
    fn default() -> Self {
        Self {
            slot1: MachineId::local(),
            slot2: None,
        }
    }
}

/// On-disk registry document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub machines: Vec<Machine>,
    #[serde(default)]
    pub slots: SlotBindings,
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self {
            machines: vec![Machine::local()],
            slots: SlotBindings::default(),
        }
    }
}

impl RegistryDocument {
    /// Repair a loaded document: "local" always exists and slots only bind
    /// to known machines
    pub fn normalize(mut self) -> Self {
        if !self.machines.iter().any(|m| m.id.is_local()) {
            self.machines.insert(0, Machine::local());
        }

        let known = |id: &MachineId| self.machines.iter().any(|m| &m.id == id);
        if !known(&self.slots.slot1) {
            tracing::warn!(
                "slot1 bound to unknown machine {}, falling back to local",
                self.slots.slot1
            );
            self.slots.slot1 = MachineId::local();
        }
        if let Some(slot2) = &self.slots.slot2 {
            if !known(slot2) {
                tracing::warn!("slot2 bound to unknown machine {}, closing it", slot2);
                self.slots.slot2 = None;
            }
        }
        self
    }
}

/// Reads and writes the registry file
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document; a missing file yields the defaults
    pub fn load(&self) -> Result<RegistryDocument> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No registry at {:?}, starting with defaults", self.path);
                return Ok(RegistryDocument::default());
            }
            Err(e) => return Err(FtError::io(&self.path, e)),
        };

        let doc: RegistryDocument = serde_json::from_str(&content).map_err(|e| {
            FtError::Persistence(format!("corrupt registry {}: {}", self.path.display(), e))
        })?;
        Ok(doc.normalize())
    }

    /// Atomically replace the registry file
    pub fn save(&self, doc: &RegistryDocument) -> Result<()> {
        let persist_err =
            |e: std::io::Error| FtError::Persistence(format!("{}: {}", self.path.display(), e));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(persist_err)?;
        }

        let json = serde_json::to_string_pretty(doc)
            .map_err(|e| FtError::Persistence(format!("failed to encode registry: {}", e)))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).map_err(persist_err)?;
        fs::rename(&tmp, &self.path).map_err(persist_err)?;

        tracing::debug!("Saved registry to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("registry.json"));
        let doc = store.load().unwrap();
        assert_eq!(doc.machines.len(), 1);
        assert!(doc.machines[0].id.is_local());
        assert_eq!(doc.slots.slot1, MachineId::local());
        assert!(doc.slots.slot2.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("sub").join("registry.json"));

        let mut doc = RegistryDocument::default();
        let mut web = Machine::agent(MachineId::new("web1"), "10.0.0.2", 38888, "s", "/root");
        web.current_dir = Some("/srv".into());
        doc.machines.push(web);
        doc.slots.slot2 = Some(MachineId::new("web1"));
        store.save(&doc).unwrap();

        assert!(!dir.path().join("sub").join("registry.json.tmp").exists());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.machines.len(), 2);
        assert_eq!(loaded.machines[1].secret.as_deref(), Some("s"));
        assert_eq!(loaded.machines[1].current_dir, None);
        assert_eq!(loaded.slots.slot2, Some(MachineId::new("web1")));
    }

    #[test]
    fn test_normalize_repairs_bindings() {
        let doc = RegistryDocument {
            machines: vec![],
            slots: SlotBindings {
                slot1: MachineId::new("gone"),
                slot2: Some(MachineId::new("also-gone")),
            },
        }
        .normalize();

        assert!(doc.machines[0].id.is_local());
        assert_eq!(doc.slots.slot1, MachineId::local());
        assert!(doc.slots.slot2.is_none());
    }

    #[test]
    fn test_corrupt_file_is_persistence_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        fs::write(&path, "{ not json").unwrap();
        let err = RegistryStore::new(path).load().unwrap_err();
        assert!(matches!(err, FtError::Persistence(_)));
    }

    #[test]
    fn test_unwritable_location_is_persistence_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let store = RegistryStore::new(blocker.join("registry.json"));
        let err = store.save(&RegistryDocument::default()).unwrap_err();
        assert!(matches!(err, FtError::Persistence(_)));
    }
}
