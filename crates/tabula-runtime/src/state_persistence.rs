#![forbid(unsafe_code)]

//! Storage backends for persisted table state.
//!
//! A backend stores opaque, versioned entries keyed by storage key. The
//! [`TableStatePort`](crate::port::TableStatePort) serializes table state into
//! these entries; backends never look inside them.
//!
//! # Backends
//!
//! - [`MemoryStorage`]: in-process map. Always available.
//! - `FileStorage`: one JSON file listing every table, state base64-encoded.
//!   Requires the `file-storage` feature.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | `StorageError::Io` | File I/O failure | Returned to the port; state in memory unaffected |
//! | `StorageError::Serialization` | JSON encode/decode | Returned; the file is left as it was |
//! | `StorageError::Corruption` | Poisoned lock, undecodable file | Returned; callers fall back to defaults |
//! | `StorageError::Unavailable` | Backend cannot be used | Returned |
//!
//! Writes to the file backend go to a temporary file that is renamed over
//! the target, so a crash mid-write leaves the previous file intact.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// Errors raised by a storage backend.
#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Serialization(String),
    Corruption(String),
    Unavailable(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "I/O error: {e}"),
            StorageError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            StorageError::Corruption(msg) => write!(f, "storage corruption: {msg}"),
            StorageError::Unavailable(msg) => write!(f, "storage unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            StorageError::Serialization(_)
            | StorageError::Corruption(_)
            | StorageError::Unavailable(_) => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// One stored entry: a storage key, the schema version that wrote it, and
/// the serialized payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: String,
    pub version: u32,
    pub data: Vec<u8>,
}

/// Pluggable persistence backend.
///
/// `save_all` replaces the whole stored set. Implementations must tolerate
/// concurrent calls from the background writer and the owning thread.
pub trait StorageBackend: Send + Sync {
    /// Name used in log fields.
    fn name(&self) -> &str;

    /// Every stored entry. Empty when nothing has been stored yet.
    fn load_all(&self) -> StorageResult<HashMap<String, StoredEntry>>;

    /// Replace every stored entry.
    fn save_all(&self, entries: &HashMap<String, StoredEntry>) -> StorageResult<()>;
}

/// In-memory backend. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStorage {
    data: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with entries.
    #[must_use]
    pub fn with_entries(entries: HashMap<String, StoredEntry>) -> Self {
        Self {
            data: RwLock::new(entries),
        }
    }
}

impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        "MemoryStorage"
    }

    fn load_all(&self) -> StorageResult<HashMap<String, StoredEntry>> {
        let guard = self
            .data
            .read()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
        Ok(guard.clone())
    }

    fn save_all(&self, entries: &HashMap<String, StoredEntry>) -> StorageResult<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
        *guard = entries.clone();
        Ok(())
    }
}

impl fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.data.read().map(|g| g.len()).unwrap_or(0);
        f.debug_struct("MemoryStorage")
            .field("entries", &count)
            .finish()
    }
}

#[cfg(feature = "file-storage")]
mod file_storage {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Serialize};
    use std::fs::{self, File};
    use std::io::{BufReader, BufWriter, Write};
    use std::path::{Path, PathBuf};

    const FILE_SCHEMA: u32 = 1;

    #[derive(Serialize, Deserialize)]
    struct TablesFile {
        schema: u32,
        #[serde(default)]
        tables: Vec<TableRecord>,
    }

    #[derive(Serialize, Deserialize)]
    struct TableRecord {
        key: String,
        version: u32,
        /// Base64 of the serialized state.
        state: String,
    }

    /// JSON file backend.
    ///
    /// ```json
    /// {
    ///   "schema": 1,
    ///   "tables": [
    ///     { "key": "data-table-state", "version": 1, "state": "eyJzb3J0aW5nIjpbXX0=" }
    ///   ]
    /// }
    /// ```
    ///
    /// Tables are written sorted by key so the file diffs cleanly.
    pub struct FileStorage {
        path: PathBuf,
    }

    impl FileStorage {
        /// Storage at `path`. The file and its parent directories are created
        /// on the first save.
        #[must_use]
        pub fn new(path: impl AsRef<Path>) -> Self {
            Self {
                path: path.as_ref().to_path_buf(),
            }
        }

        #[must_use]
        pub fn path(&self) -> &Path {
            &self.path
        }

        fn staging_path(&self) -> PathBuf {
            let mut staging = self.path.clone().into_os_string();
            staging.push(".partial");
            PathBuf::from(staging)
        }

        fn read_file(&self) -> StorageResult<Option<TablesFile>> {
            let file = match File::open(&self.path) {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            serde_json::from_reader(BufReader::new(file))
                .map(Some)
                .map_err(|e| StorageError::Serialization(format!("unreadable tables file: {e}")))
        }
    }

    impl StorageBackend for FileStorage {
        fn name(&self) -> &str {
            "FileStorage"
        }

        fn load_all(&self) -> StorageResult<HashMap<String, StoredEntry>> {
            let Some(file) = self.read_file()? else {
                return Ok(HashMap::new());
            };
            if file.schema != FILE_SCHEMA {
                tracing::warn!(
                    schema = file.schema,
                    expected = FILE_SCHEMA,
                    path = %self.path.display(),
                    "tables file schema not understood; starting empty"
                );
                return Ok(HashMap::new());
            }

            let mut entries = HashMap::with_capacity(file.tables.len());
            for record in file.tables {
                let Ok(data) = STANDARD.decode(&record.state) else {
                    tracing::warn!(key = %record.key, "table entry with invalid base64 skipped");
                    continue;
                };
                entries.insert(
                    record.key.clone(),
                    StoredEntry {
                        key: record.key,
                        version: record.version,
                        data,
                    },
                );
            }
            Ok(entries)
        }

        fn save_all(&self, entries: &HashMap<String, StoredEntry>) -> StorageResult<()> {
            if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }

            let mut tables: Vec<TableRecord> = entries
                .iter()
                .map(|(key, entry)| TableRecord {
                    key: key.clone(),
                    version: entry.version,
                    state: STANDARD.encode(&entry.data),
                })
                .collect();
            tables.sort_by(|a, b| a.key.cmp(&b.key));
            let body = TablesFile {
                schema: FILE_SCHEMA,
                tables,
            };

            let staging = self.staging_path();
            let mut out = BufWriter::new(File::create(&staging)?);
            serde_json::to_writer_pretty(&mut out, &body)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            out.flush()?;
            out.get_ref().sync_all()?;
            drop(out);
            fs::rename(&staging, &self.path)?;

            tracing::debug!(
                path = %self.path.display(),
                tables = entries.len(),
                "wrote tables file"
            );
            Ok(())
        }
    }

    impl fmt::Debug for FileStorage {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("FileStorage")
                .field("path", &self.path)
                .finish()
        }
    }

}

#[cfg(feature = "file-storage")]
pub use file_storage::FileStorage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_replaces_every_entry() {
        let storage = MemoryStorage::new();
        assert!(storage.load_all().unwrap().is_empty());

        let mut entries = HashMap::new();
        entries.insert(
            "a".to_string(),
            StoredEntry {
                key: "a".into(),
                version: 1,
                data: b"{}".to_vec(),
            },
        );
        storage.save_all(&entries).unwrap();
        assert_eq!(storage.load_all().unwrap()["a"].data, b"{}");

        storage.save_all(&HashMap::new()).unwrap();
        assert!(storage.load_all().unwrap().is_empty());
        assert_eq!(format!("{storage:?}"), "MemoryStorage { entries: 0 }");
    }

    #[test]
    fn storage_error_display_and_source() {
        use std::error::Error;
        let io = StorageError::from(std::io::Error::other("disk full"));
        assert!(io.to_string().contains("disk full"));
        assert!(io.source().is_some());
        assert!(StorageError::Corruption("x".into()).source().is_none());
    }
}
