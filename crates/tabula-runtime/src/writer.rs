#![forbid(unsafe_code)]

//! Background persistence writer.
//!
//! Saves run on a dedicated thread so intent application never waits on
//! storage. Requests queued while a write is in progress are coalesced: only
//! the latest state per key is written. Failures come back on a warning
//! channel that the owner drains with [`BackgroundWriter::drain_warnings`].
//!
//! Dropping the writer flushes pending saves and joins the thread.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::thread;

use tabula_core::TableState;

use crate::port::{PersistenceWriteError, TableStatePort};

enum Command {
    Save { key: String, state: TableState },
    Flush(mpsc::Sender<()>),
    Shutdown,
}

/// Counters reported by the worker on flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Save requests received.
    pub requested: u64,
    /// Writes that reached the port.
    pub written: u64,
}

/// Fire-and-forget state writer.
pub struct BackgroundWriter {
    commands: mpsc::Sender<Command>,
    warnings: mpsc::Receiver<PersistenceWriteError>,
    stats: mpsc::Receiver<WriterStats>,
    last_stats: WriterStats,
    thread: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for BackgroundWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundWriter")
            .field("running", &self.thread.is_some())
            .field("stats", &self.last_stats)
            .finish()
    }
}

impl BackgroundWriter {
    /// Start a writer thread over `port`.
    pub fn spawn(port: TableStatePort) -> std::io::Result<Self> {
        let (commands, rx) = mpsc::channel();
        let (warn_tx, warnings) = mpsc::channel();
        let (stats_tx, stats) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("tabula-state-writer".into())
            .spawn(move || run(port, rx, warn_tx, stats_tx))?;
        Ok(Self {
            commands,
            warnings,
            stats,
            last_stats: WriterStats::default(),
            thread: Some(thread),
        })
    }

    /// Queue a save. Returns immediately.
    pub fn submit(&self, key: &str, state: TableState) {
        let command = Command::Save {
            key: key.to_owned(),
            state,
        };
        if self.commands.send(command).is_err() {
            tracing::warn!(key, "state writer stopped; save dropped");
        }
    }

    /// Block until every queued save has been written.
    pub fn flush(&mut self) {
        let (done_tx, done_rx) = mpsc::channel();
        if self.commands.send(Command::Flush(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.recv();
        while let Ok(stats) = self.stats.try_recv() {
            self.last_stats = stats;
        }
    }

    /// Counters as of the last [`flush`](Self::flush).
    #[must_use]
    pub fn stats(&self) -> WriterStats {
        self.last_stats
    }

    /// Write failures reported since the last call.
    pub fn drain_warnings(&self) -> Vec<PersistenceWriteError> {
        self.warnings.try_iter().collect()
    }
}

impl Drop for BackgroundWriter {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn run(
    port: TableStatePort,
    commands: mpsc::Receiver<Command>,
    warnings: mpsc::Sender<PersistenceWriteError>,
    stats_out: mpsc::Sender<WriterStats>,
) {
    let mut stats = WriterStats::default();
    let mut pending: BTreeMap<String, TableState> = BTreeMap::new();

    while let Ok(first) = commands.recv() {
        let mut batch = vec![first];
        batch.extend(commands.try_iter());

        let mut replies = Vec::new();
        let mut shutdown = false;
        for command in batch {
            match command {
                Command::Save { key, state } => {
                    stats.requested += 1;
                    pending.insert(key, state);
                }
                Command::Flush(reply) => replies.push(reply),
                Command::Shutdown => shutdown = true,
            }
        }

        for (key, state) in std::mem::take(&mut pending) {
            match port.save(&key, &state) {
                Ok(()) => stats.written += 1,
                Err(error) => {
                    tracing::warn!(key = %error.key, %error, "background state write failed");
                    let _ = warnings.send(error);
                }
            }
        }

        if !replies.is_empty() {
            let _ = stats_out.send(stats);
        }
        for reply in replies {
            let _ = reply.send(());
        }
        if shutdown {
            break;
        }
    }
    tracing::debug!(
        requested = stats.requested,
        written = stats.written,
        "state writer stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_persistence::{StorageBackend, StorageError, StorageResult, StoredEntry};
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tabula_core::{ColumnDescriptor, ColumnRegistry};

    fn registry() -> ColumnRegistry<Value> {
        ColumnRegistry::new(vec![ColumnDescriptor::field("a")]).unwrap()
    }

    #[test]
    fn latest_state_wins_after_flush() {
        let port = TableStatePort::in_memory();
        let mut writer = BackgroundWriter::spawn(port.clone()).unwrap();
        for size in [10, 20, 30] {
            writer.submit("t", TableState::with_page_size(size));
        }
        writer.flush();

        let restored = port.load("t", TableState::default(), &registry()).unwrap();
        assert_eq!(restored.state.pagination.page_size, 30);
        let stats = writer.stats();
        assert_eq!(stats.requested, 3);
        assert!(stats.written >= 1 && stats.written <= 3);
        assert!(writer.drain_warnings().is_empty());
    }

    #[test]
    fn drop_flushes_pending_saves() {
        let port = TableStatePort::in_memory();
        {
            let writer = BackgroundWriter::spawn(port.clone()).unwrap();
            writer.submit("t", TableState::with_page_size(40));
        }
        assert!(port.load_entry("t").is_some());
    }

    #[test]
    fn failures_surface_as_warnings() {
        struct ReadOnly;
        impl StorageBackend for ReadOnly {
            fn name(&self) -> &str {
                "ReadOnly"
            }
            fn load_all(&self) -> StorageResult<HashMap<String, StoredEntry>> {
                Ok(HashMap::new())
            }
            fn save_all(&self, _: &HashMap<String, StoredEntry>) -> StorageResult<()> {
                Err(StorageError::Unavailable("read-only".into()))
            }
        }

        let mut writer = BackgroundWriter::spawn(TableStatePort::new(Arc::new(ReadOnly))).unwrap();
        writer.submit("t", TableState::default());
        writer.flush();
        let warnings = writer.drain_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].key, "t");
        assert!(writer.drain_warnings().is_empty());
    }
}
