#![forbid(unsafe_code)]

//! Core types for the Tabula headless table engine.
//!
//! This crate owns the column schema ([`ColumnRegistry`]), row identity
//! ([`RowIdResolver`]), the persisted [`TableState`] with its normalization
//! and lenient restore, the shared error taxonomy, and [`TableConfig`].
//! Derivation lives in `tabula-model`; ports and the table owner live in
//! `tabula-runtime`.

pub mod column;
pub mod config;
pub mod error;
pub mod identity;
pub mod restore;
pub mod state;
pub mod value;

pub use column::{
    Accessor, Aggregation, Capabilities, ColumnDescriptor, ColumnRegistry, CompareFn, FilterFn,
    FilterKind, SelectOption, SizeBounds, SortKind,
};
pub use config::{ConfigError, ConfigParse, TableConfig};
pub use error::{ColumnError, PredicateError, StateRestoreError};
pub use identity::{RowId, RowIdResolver};
pub use restore::{Restored, merge_fields, restore_state};
pub use state::{
    ColumnFilter, ColumnPinning, DEFAULT_PAGE_SIZE, FilterValue, IdSet, Pagination, PinSide,
    SortEntry, TableState, page_count,
};
pub use value::{CellValue, Record};
