#![forbid(unsafe_code)]

//! Row model derivation for the Tabula headless table engine.
//!
//! - [`pipeline`]: filter, group, sort, flatten, and paginate, memoized per stage.
//! - [`selection`]: pure id-set operations for selection and expansion.
//! - [`layout`]: visible column order, pinning regions, and widths.
//! - [`intent`]: the [`Intent`] enum and its pure reducer.

pub mod filter;
pub mod group;
pub mod intent;
pub mod layout;
pub mod pipeline;
pub mod rows;
pub mod selection;
pub mod sort;

pub use intent::{Intent, ReduceContext, reduce};
pub use layout::{ColumnLayout, VisibleColumn};
pub use pipeline::{PageSlice, Pipeline, PipelineOptions, PipelineStats, RowModel, derive};
pub use rows::{GroupRow, Row, RowKind, RowTree};
pub use selection::SelectAllScope;
