#![forbid(unsafe_code)]

//! Tabula public facade crate.
//!
//! Re-exports the types an application needs to describe columns, own a
//! [`Table`], dispatch [`Intent`]s, and read the derived row model, plus a
//! [`prelude`] for day-to-day use.
//!
//! ```
//! use serde_json::json;
//! use tabula::prelude::*;
//!
//! let registry = ColumnRegistry::new(vec![
//!     ColumnDescriptor::field("name"),
//!     ColumnDescriptor::field("age"),
//! ])?;
//! let mut table = Table::builder(registry)
//!     .records(vec![json!({"name": "ada", "age": 36}), json!({"name": "alan", "age": 41})])
//!     .build();
//!
//! table.dispatch(Intent::SetGlobalFilter("ala".into()));
//! assert_eq!(table.model().filtered_leaf_count(), 1);
//! # Ok::<(), tabula::Error>(())
//! ```

use std::fmt;

// --- Core re-exports -------------------------------------------------------

pub use tabula_core::{
    Aggregation, Capabilities, CellValue, ColumnDescriptor, ColumnError, ColumnFilter,
    ColumnRegistry, ConfigError, FilterKind, FilterValue, IdSet, PinSide, PredicateError, Record,
    RowId, RowIdResolver, SelectOption, SizeBounds, SortEntry, SortKind, StateRestoreError,
    TableConfig, TableState,
};

// --- Model re-exports ------------------------------------------------------

pub use tabula_model::{
    ColumnLayout, Intent, PipelineStats, Row, RowKind, RowModel, SelectAllScope, VisibleColumn,
};

// --- Virtualization re-exports ---------------------------------------------

pub use tabula_virtual::{Align, SizeEstimator, VirtualItem, Window, WindowCalculator};

// --- Runtime re-exports ----------------------------------------------------

#[cfg(feature = "file-storage")]
pub use tabula_runtime::FileStorage;
pub use tabula_runtime::{
    DataSource, DelimitedTextSink, ExportError, ExportSink, ExportSnapshot, FetchRequest,
    FetchResponse, FetchStatus, MemoryStorage, PersistenceMode, PersistenceWriteError,
    SourceFetchError, StorageBackend, StorageError, Table, TableBuilder, TableOptions,
    TableStatePort,
};

/// Crate namespaces for everything not re-exported at the top level.
pub mod schema {
    pub use tabula_core::*;
}

pub mod model {
    pub use tabula_model::*;
}

pub mod virtualize {
    pub use tabula_virtual::*;
}

pub mod runtime {
    pub use tabula_runtime::*;
}

// --- Errors ---------------------------------------------------------------

/// Top-level error type for Tabula applications.
#[derive(Debug)]
pub enum Error {
    /// Invalid column definitions.
    Column(ColumnError),
    /// A state write did not reach storage.
    Persistence(PersistenceWriteError),
    /// Storage backend failure outside a table write.
    Storage(StorageError),
    /// A data source fetch failed.
    Fetch(SourceFetchError),
    /// An export sink failed.
    Export(ExportError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(err) => write!(f, "{err}"),
            Self::Persistence(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Fetch(err) => write!(f, "{err}"),
            Self::Export(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Column(err) => Some(err),
            Self::Persistence(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::Fetch(err) => Some(err),
            Self::Export(err) => Some(err),
        }
    }
}

impl From<ColumnError> for Error {
    fn from(err: ColumnError) -> Self {
        Self::Column(err)
    }
}

impl From<PersistenceWriteError> for Error {
    fn from(err: PersistenceWriteError) -> Self {
        Self::Persistence(err)
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<SourceFetchError> for Error {
    fn from(err: SourceFetchError) -> Self {
        Self::Fetch(err)
    }
}

impl From<ExportError> for Error {
    fn from(err: ExportError) -> Self {
        Self::Export(err)
    }
}

/// Standard result type for Tabula APIs.
pub type Result<T> = std::result::Result<T, Error>;

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        Align, ColumnDescriptor, ColumnRegistry, DelimitedTextSink, Error, ExportSink,
        FilterValue, Intent, PinSide, Result, RowIdResolver, SelectAllScope, SortEntry, Table,
        TableConfig, TableOptions, TableState, TableStatePort,
    };
}
