//! Federation snapshots for save/restore
//!
//! A snapshot is written once per (federation name, save label) pair and
//! holds enough to restore membership flags: the federation identity and,
//! per federate, its name, handle, time-management flags and regulator time.
//! Object-model content is not part of it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::handles::{FederateHandle, FederationHandle, FederationTime};

/// Errors raised by snapshot stores
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("No snapshot '{label}' for federation '{federation}'")]
    NotFound { federation: String, label: String },

    #[error("Snapshot belongs to federation '{found}', expected '{expected}'")]
    FederationMismatch { expected: String, found: String },

    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot store unavailable: {0}")]
    Unavailable(String),
}

/// Identity of the saved federation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFederation {
    pub name: String,
    pub handle: FederationHandle,
}

/// One federate's restorable state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFederate {
    pub name: String,
    pub handle: FederateHandle,
    pub constrained: bool,
    pub regulator: bool,
    /// Logical time of a regulator, absent in older snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<FederationTime>,
}

/// Persisted coordinator state for one save label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederationSnapshot {
    pub federation: SnapshotFederation,
    #[serde(rename = "saved-at")]
    pub saved_at: DateTime<Utc>,
    pub federates: Vec<SnapshotFederate>,
}

impl FederationSnapshot {
    pub fn new(name: impl Into<String>, handle: FederationHandle, federates: Vec<SnapshotFederate>) -> Self {
        Self {
            federation: SnapshotFederation {
                name: name.into(),
                handle,
            },
            saved_at: Utc::now(),
            federates,
        }
    }

    pub fn federate(&self, name: &str) -> Option<&SnapshotFederate> {
        self.federates.iter().find(|f| f.name == name)
    }
}

/// Durable storage for federation snapshots
pub trait SnapshotStore: Send + Sync {
    fn save(&self, label: &str, snapshot: &FederationSnapshot) -> Result<(), PersistenceError>;

    fn load(&self, federation: &str, label: &str) -> Result<FederationSnapshot, PersistenceError>;
}

/// Pretty-printed JSON files in one directory
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    dir: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(?dir, "JsonSnapshotStore::new: called");
        Self { dir }
    }

    /// `<federation>/<label>.json` under the store directory
    ///
    /// Both names are reduced to a single path component so neither can
    /// climb out of the directory.
    pub fn snapshot_path(&self, federation: &str, label: &str) -> PathBuf {
        self.dir
            .join(path_component(federation))
            .join(format!("{}.json", path_component(label)))
    }
}

fn path_component(name: &str) -> String {
    match name {
        "" | "." | ".." => "_".repeat(name.len().max(1)),
        _ => name.replace(['/', '\\'], "_"),
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn save(&self, label: &str, snapshot: &FederationSnapshot) -> Result<(), PersistenceError> {
        let path = self.snapshot_path(&snapshot.federation.name, label);
        debug!(?path, "JsonSnapshotStore::save: called");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&path, content)?;
        info!(?path, federates = snapshot.federates.len(), "Snapshot written");
        Ok(())
    }

    fn load(&self, federation: &str, label: &str) -> Result<FederationSnapshot, PersistenceError> {
        let path = self.snapshot_path(federation, label);
        debug!(?path, "JsonSnapshotStore::load: called");
        if !path.exists() {
            return Err(PersistenceError::NotFound {
                federation: federation.to_string(),
                label: label.to_string(),
            });
        }
        let content = std::fs::read_to_string(&path)?;
        let snapshot: FederationSnapshot = serde_json::from_str(&content)?;
        if snapshot.federation.name != federation {
            return Err(PersistenceError::FederationMismatch {
                expected: federation.to_string(),
                found: snapshot.federation.name,
            });
        }
        Ok(snapshot)
    }
}

/// Process-local store, mostly for tests
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<(String, String), FederationSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, label: &str, snapshot: &FederationSnapshot) -> Result<(), PersistenceError> {
        debug!(%label, federation = %snapshot.federation.name, "MemorySnapshotStore::save: called");
        let mut snapshots = self
            .snapshots
            .lock()
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))?;
        snapshots.insert(
            (snapshot.federation.name.clone(), label.to_string()),
            snapshot.clone(),
        );
        Ok(())
    }

    fn load(&self, federation: &str, label: &str) -> Result<FederationSnapshot, PersistenceError> {
        debug!(%label, %federation, "MemorySnapshotStore::load: called");
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))?;
        snapshots
            .get(&(federation.to_string(), label.to_string()))
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound {
                federation: federation.to_string(),
                label: label.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn snapshot() -> FederationSnapshot {
        FederationSnapshot::new(
            "Aircraft",
            FederationHandle(1),
            vec![
                SnapshotFederate {
                    name: "alpha".to_string(),
                    handle: FederateHandle(1),
                    constrained: true,
                    regulator: false,
                    time: None,
                },
                SnapshotFederate {
                    name: "beta".to_string(),
                    handle: FederateHandle(2),
                    constrained: false,
                    regulator: true,
                    time: Some(FederationTime(12.5)),
                },
            ],
        )
    }

    #[test]
    fn test_json_store_save_and_load() {
        let temp = tempdir().unwrap();
        let store = JsonSnapshotStore::new(temp.path());

        store.save("checkpoint", &snapshot()).unwrap();
        assert!(temp.path().join("Aircraft").join("checkpoint.json").exists());

        let loaded = store.load("Aircraft", "checkpoint").unwrap();
        assert_eq!(loaded, snapshot_with_time(loaded.saved_at));
        assert!(loaded.federate("beta").unwrap().regulator);
        assert_eq!(loaded.federate("beta").unwrap().time, Some(FederationTime(12.5)));
    }

    fn snapshot_with_time(saved_at: DateTime<Utc>) -> FederationSnapshot {
        FederationSnapshot {
            saved_at,
            ..snapshot()
        }
    }

    #[test]
    fn test_json_store_missing_label() {
        let temp = tempdir().unwrap();
        let store = JsonSnapshotStore::new(temp.path());
        let err = store.load("Aircraft", "nothing").unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound { .. }));
    }

    #[test]
    fn test_json_store_rejects_foreign_snapshot() {
        let temp = tempdir().unwrap();
        let store = JsonSnapshotStore::new(temp.path());
        store.save("checkpoint", &snapshot()).unwrap();
        std::fs::create_dir_all(temp.path().join("Ships")).unwrap();
        std::fs::rename(
            temp.path().join("Aircraft").join("checkpoint.json"),
            temp.path().join("Ships").join("checkpoint.json"),
        )
        .unwrap();

        let err = store.load("Ships", "checkpoint").unwrap_err();
        assert!(matches!(err, PersistenceError::FederationMismatch { .. }));
    }

    #[test]
    fn test_label_cannot_escape_directory() {
        let store = JsonSnapshotStore::new("/var/lib/rtig");
        let path = store.snapshot_path("Aircraft", "../../etc/passwd");
        assert_eq!(path.parent().unwrap(), std::path::Path::new("/var/lib/rtig/Aircraft"));

        let path = store.snapshot_path("..", "..");
        assert_eq!(path, std::path::Path::new("/var/lib/rtig/__/__.json"));
    }

    #[test]
    fn test_underscored_names_do_not_collide() {
        let temp = tempdir().unwrap();
        let store = JsonSnapshotStore::new(temp.path());
        assert_ne!(store.snapshot_path("a_b", "c"), store.snapshot_path("a", "b_c"));

        let first = FederationSnapshot::new("a_b", FederationHandle(1), vec![]);
        let second = FederationSnapshot::new("a", FederationHandle(2), vec![]);
        store.save("c", &first).unwrap();
        store.save("b_c", &second).unwrap();

        assert_eq!(store.load("a_b", "c").unwrap().federation.handle, FederationHandle(1));
        assert_eq!(store.load("a", "b_c").unwrap().federation.handle, FederationHandle(2));
    }

    #[test]
    fn test_snapshot_without_time_still_loads() {
        let json = r#"{
            "federation": { "name": "Aircraft", "handle": 1 },
            "saved-at": "2024-05-01T10:00:00Z",
            "federates": [
                { "name": "alpha", "handle": 1, "constrained": false, "regulator": true }
            ]
        }"#;
        let snapshot: FederationSnapshot = serde_json::from_str(json).unwrap();
        let alpha = snapshot.federate("alpha").unwrap();
        assert!(alpha.regulator);
        assert_eq!(alpha.time, None);
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySnapshotStore::new();
        assert!(store.is_empty());
        store.save("one", &snapshot()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.load("Aircraft", "one").is_ok());
        assert!(store.load("Aircraft", "two").is_err());
    }
}
