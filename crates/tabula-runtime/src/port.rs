#![forbid(unsafe_code)]

//! Persisted state port.
//!
//! [`TableStatePort`] maps table state to versioned [`StoredEntry`] payloads
//! in a [`StorageBackend`]. Loading is lenient: whatever the backend returns,
//! the caller gets a normalized state plus a list of issues, or nothing at
//! all when no entry exists.

use std::fmt;
use std::sync::Arc;

use tabula_core::{ColumnRegistry, Restored, StateRestoreError, TableState, restore_state};

use crate::state_persistence::{MemoryStorage, StorageBackend, StorageError, StoredEntry};

/// Schema version written into every stored entry.
pub const STATE_VERSION: u32 = 1;

/// A state write that did not reach storage. Never fatal: the in-memory
/// state stays authoritative.
#[derive(Debug)]
pub struct PersistenceWriteError {
    pub key: String,
    pub source: StorageError,
}

impl fmt::Display for PersistenceWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to persist table state '{}': {}", self.key, self.source)
    }
}

impl std::error::Error for PersistenceWriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Load/save access to persisted table state. Cheap to clone.
#[derive(Clone)]
pub struct TableStatePort {
    backend: Arc<dyn StorageBackend>,
}

impl fmt::Debug for TableStatePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableStatePort")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl TableStatePort {
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Port over a fresh [`MemoryStorage`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Port over a JSON file.
    #[cfg(feature = "file-storage")]
    #[must_use]
    pub fn with_file(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(Arc::new(crate::state_persistence::FileStorage::new(path)))
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Raw stored payload for `key`.
    ///
    /// Backend failures are logged and treated as "nothing stored".
    #[must_use]
    pub fn load_entry(&self, key: &str) -> Option<StoredEntry> {
        match self.backend.load_all() {
            Ok(mut entries) => entries.remove(key),
            Err(error) => {
                tracing::warn!(
                    key,
                    backend = self.backend.name(),
                    %error,
                    "could not read persisted table state"
                );
                None
            }
        }
    }

    /// Restore the state stored under `key` over `base`.
    ///
    /// Returns `None` when nothing is stored. Otherwise the result is always
    /// normalized against `registry`; undecodable payloads and entries from a
    /// different schema version are merged leniently and reported as issues.
    #[must_use]
    pub fn load<R>(
        &self,
        key: &str,
        base: TableState,
        registry: &ColumnRegistry<R>,
    ) -> Option<Restored> {
        let entry = self.load_entry(key)?;
        let blob = String::from_utf8_lossy(&entry.data);
        let mut restored = restore_state(base, &blob, registry);
        if entry.version != STATE_VERSION {
            let issue = StateRestoreError::VersionMismatch {
                stored: entry.version,
                expected: STATE_VERSION,
            };
            tracing::warn!(key, %issue, "persisted table state issue");
            restored.issues.insert(0, issue);
        }
        tracing::debug!(
            key,
            issues = restored.issues.len(),
            "restored persisted table state"
        );
        Some(restored)
    }

    /// Store `state` under `key`, keeping every other key.
    pub fn save(&self, key: &str, state: &TableState) -> Result<(), PersistenceWriteError> {
        let wrap = |source| PersistenceWriteError {
            key: key.to_owned(),
            source,
        };
        let data = state
            .to_json()
            .map_err(|e| wrap(StorageError::Serialization(e.to_string())))?
            .into_bytes();
        let mut entries = self.backend.load_all().map_err(wrap)?;
        entries.insert(
            key.to_owned(),
            StoredEntry {
                key: key.to_owned(),
                version: STATE_VERSION,
                data,
            },
        );
        self.backend.save_all(&entries).map_err(wrap)?;
        tracing::trace!(key, backend = self.backend.name(), "persisted table state");
        Ok(())
    }

    /// Remove the entry for `key`.
    pub fn remove(&self, key: &str) -> Result<(), PersistenceWriteError> {
        let wrap = |source| PersistenceWriteError {
            key: key.to_owned(),
            source,
        };
        let mut entries = self.backend.load_all().map_err(wrap)?;
        if entries.remove(key).is_some() {
            self.backend.save_all(&entries).map_err(wrap)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::collections::HashMap;
    use tabula_core::{ColumnDescriptor, SortEntry};

    fn registry() -> ColumnRegistry<Value> {
        ColumnRegistry::new(vec![
            ColumnDescriptor::field("title"),
            ColumnDescriptor::field("status"),
        ])
        .unwrap()
    }

    #[test]
    fn nothing_stored_loads_none() {
        let port = TableStatePort::in_memory();
        assert!(port.load("t", TableState::default(), &registry()).is_none());
    }

    #[test]
    fn save_then_load_restores_the_state() {
        let port = TableStatePort::in_memory();
        let reg = registry();
        let mut state = TableState::default().normalized(&reg);
        state.sorting = vec![SortEntry::desc("status")];
        state.row_selection.insert("4");
        port.save("t", &state).unwrap();
        port.save("other", &TableState::default()).unwrap();

        let restored = port.load("t", TableState::default(), &reg).unwrap();
        assert!(restored.is_clean());
        assert_eq!(restored.state, state);

        port.remove("t").unwrap();
        assert!(port.load("t", TableState::default(), &reg).is_none());
        assert!(port.load_entry("other").is_some());
    }

    #[test]
    fn version_mismatch_is_reported_but_merged() {
        let mut entries = HashMap::new();
        entries.insert(
            "t".to_string(),
            StoredEntry {
                key: "t".into(),
                version: 0,
                data: br#"{"grouping":["status"],"legacy":1}"#.to_vec(),
            },
        );
        let port = TableStatePort::new(Arc::new(MemoryStorage::with_entries(entries)));
        let restored = port.load("t", TableState::default(), &registry()).unwrap();
        assert_eq!(restored.state.grouping, vec!["status"]);
        assert_eq!(
            restored.issues,
            vec![
                StateRestoreError::VersionMismatch {
                    stored: 0,
                    expected: STATE_VERSION
                },
                StateRestoreError::UnknownField("legacy".into()),
            ]
        );
    }

    #[test]
    fn write_failures_name_the_key() {
        struct Broken;
        impl StorageBackend for Broken {
            fn name(&self) -> &str {
                "Broken"
            }
            fn load_all(&self) -> crate::state_persistence::StorageResult<HashMap<String, StoredEntry>> {
                Ok(HashMap::new())
            }
            fn save_all(&self, _: &HashMap<String, StoredEntry>) -> crate::state_persistence::StorageResult<()> {
                Err(StorageError::Unavailable("read-only".into()))
            }
        }
        let port = TableStatePort::new(Arc::new(Broken));
        let err = port.save("t", &TableState::default()).unwrap_err();
        assert_eq!(err.key, "t");
        assert!(err.to_string().contains("read-only"));
    }
}
