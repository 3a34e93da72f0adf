#![forbid(unsafe_code)]

//! Runtime for the Tabula headless table engine.
//!
//! - [`table`]: the [`Table`] owner that applies intents and re-derives rows.
//! - [`port`] and [`state_persistence`]: persisted state over pluggable storage.
//! - [`writer`]: background persistence writes.
//! - [`source`]: server-side data with last-request-wins fetches.
//! - [`export`]: export snapshots and delimited-text output.
//!
//! # Feature Flags
//!
//! - `file-storage`: JSON file storage backend (`FileStorage`).

pub mod export;
pub mod options;
pub mod port;
pub mod source;
pub mod state_persistence;
pub mod table;
pub mod writer;

pub use export::{DelimitedTextSink, ExportError, ExportSink, ExportSnapshot};
pub use options::{PersistenceMode, TableOptions};
pub use port::{PersistenceWriteError, STATE_VERSION, TableStatePort};
pub use source::{
    DataSource, FetchCoordinator, FetchRequest, FetchResponse, FetchStatus, SourceFetchError,
    Ticket,
};
#[cfg(feature = "file-storage")]
pub use state_persistence::FileStorage;
pub use state_persistence::{MemoryStorage, StorageBackend, StorageError, StorageResult, StoredEntry};
pub use table::{SelectablePredicate, Table, TableBuilder};
pub use writer::{BackgroundWriter, WriterStats};
