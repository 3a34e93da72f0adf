#![forbid(unsafe_code)]

//! Column descriptors and the column registry.
//!
//! A [`ColumnDescriptor`] is immutable once registered and is identified by
//! its id everywhere downstream: state slices, filter entries, sort entries,
//! grouping levels, and export headers all refer to columns by id.
//!
//! Per-column filtering and ordering are tagged enums that the pipeline
//! matches on. Only the `Custom` variants carry closures.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::error::{ColumnError, PredicateError};
use crate::state::FilterValue;
use crate::value::{CellValue, Record};

bitflags! {
    /// Capability flags for a column.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Column participates in sorting.
        const SORTABLE = 1 << 0;
        /// Column participates in column and global filtering.
        const FILTERABLE = 1 << 1;
        /// Column can be used as a grouping level.
        const GROUPABLE = 1 << 2;
        /// Column width can be changed.
        const RESIZABLE = 1 << 3;
        /// Column can be pinned left or right.
        const PINNABLE = 1 << 4;
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::all()
    }
}

/// Reads a cell value out of a raw record.
pub enum Accessor<R> {
    /// Named field read through [`Record::field`].
    Field {
        name: String,
        read: fn(&R, &str) -> Option<CellValue>,
    },
    /// Arbitrary derivation from the whole record.
    Derived(Arc<dyn Fn(&R) -> CellValue + Send + Sync>),
}

impl<R> Accessor<R> {
    /// Evaluate the accessor against a record. Missing fields yield `Null`.
    pub fn evaluate(&self, record: &R) -> CellValue {
        match self {
            Accessor::Field { name, read } => read(record, name).unwrap_or_default(),
            Accessor::Derived(f) => f(record),
        }
    }
}

impl<R> Clone for Accessor<R> {
    fn clone(&self) -> Self {
        match self {
            Accessor::Field { name, read } => Accessor::Field {
                name: name.clone(),
                read: *read,
            },
            Accessor::Derived(f) => Accessor::Derived(Arc::clone(f)),
        }
    }
}

impl<R> fmt::Debug for Accessor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Field { name, .. } => f.debug_tuple("Field").field(name).finish(),
            Accessor::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

/// Caller-supplied filter predicate.
pub type FilterFn = Arc<dyn Fn(&CellValue, &FilterValue) -> Result<bool, PredicateError> + Send + Sync>;

/// Caller-supplied comparator.
pub type CompareFn =
    Arc<dyn Fn(&CellValue, &CellValue) -> Result<Ordering, PredicateError> + Send + Sync>;

/// One choice offered by a select filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

impl SelectOption {
    #[must_use]
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// How a column's per-column filter is evaluated.
#[derive(Clone, Default)]
pub enum FilterKind {
    /// No per-column filter. The column still takes part in the global filter
    /// when it is [`Capabilities::FILTERABLE`].
    #[default]
    None,
    /// Case-insensitive substring match.
    Text,
    /// Membership of the stringified value in a set of accepted values.
    Select { options: Vec<SelectOption> },
    /// Caller predicate.
    Custom(FilterFn),
}

impl fmt::Debug for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::None => f.write_str("None"),
            FilterKind::Text => f.write_str("Text"),
            FilterKind::Select { options } => f.debug_struct("Select").field("options", options).finish(),
            FilterKind::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// How two values of a column are ordered.
#[derive(Clone, Default)]
pub enum SortKind {
    /// Numbers by magnitude, text by code point. Mixed kinds do not compare.
    #[default]
    Auto,
    /// Always compare stringified values by code point.
    Text,
    /// Compare numeric views; non-numeric values do not compare.
    Numeric,
    /// Caller comparator.
    Custom(CompareFn),
}

impl fmt::Debug for SortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKind::Auto => f.write_str("Auto"),
            SortKind::Text => f.write_str("Text"),
            SortKind::Numeric => f.write_str("Numeric"),
            SortKind::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Aggregation computed for group rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregation {
    /// Group rows show no value for this column.
    None,
    /// Number of leaf rows.
    #[default]
    Count,
    /// Sum of numeric leaf values.
    Sum,
    /// Smallest numeric leaf value.
    Min,
    /// Largest numeric leaf value.
    Max,
    /// Mean of numeric leaf values.
    Mean,
    /// Number of distinct stringified leaf values.
    UniqueCount,
}

/// Width bounds for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBounds {
    pub min: u32,
    pub preferred: u32,
    pub max: u32,
}

impl SizeBounds {
    #[must_use]
    pub const fn new(min: u32, preferred: u32, max: u32) -> Self {
        Self { min, preferred, max }
    }

    /// Clamp a requested width into the bounds. Non-finite input yields the
    /// preferred width.
    #[must_use]
    pub fn clamp(&self, size: f64) -> f64 {
        if !size.is_finite() {
            return f64::from(self.preferred);
        }
        size.clamp(f64::from(self.min), f64::from(self.max))
    }
}

impl Default for SizeBounds {
    fn default() -> Self {
        Self::new(50, 150, 500)
    }
}

/// Immutable description of one column.
pub struct ColumnDescriptor<R> {
    id: String,
    header: Option<String>,
    accessor: Accessor<R>,
    capabilities: Capabilities,
    filter: FilterKind,
    sort: SortKind,
    aggregation: Aggregation,
    size: SizeBounds,
}

impl<R: Record> ColumnDescriptor<R> {
    /// Column reading the record field with the same name as the id.
    #[must_use]
    pub fn field(id: impl Into<String>) -> Self {
        let id = id.into();
        let accessor = Accessor::Field {
            name: id.clone(),
            read: <R as Record>::field,
        };
        Self::with_accessor(id, accessor)
    }

    /// Column reading a record field whose name differs from the id.
    #[must_use]
    pub fn field_named(id: impl Into<String>, field: impl Into<String>) -> Self {
        let accessor = Accessor::Field {
            name: field.into(),
            read: <R as Record>::field,
        };
        Self::with_accessor(id, accessor)
    }
}

impl<R> ColumnDescriptor<R> {
    /// Column computed from the whole record.
    #[must_use]
    pub fn derived(
        id: impl Into<String>,
        f: impl Fn(&R) -> CellValue + Send + Sync + 'static,
    ) -> Self {
        Self::with_accessor(id, Accessor::Derived(Arc::new(f)))
    }

    fn with_accessor(id: impl Into<String>, accessor: Accessor<R>) -> Self {
        Self {
            id: id.into(),
            header: None,
            accessor,
            capabilities: Capabilities::default(),
            filter: FilterKind::None,
            sort: SortKind::Auto,
            aggregation: Aggregation::Count,
            size: SizeBounds::default(),
        }
    }

    /// Set the header text used for display and export.
    #[must_use]
    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    /// Replace the capability set.
    #[must_use]
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Turn one capability on or off.
    #[must_use]
    pub fn with_capability(mut self, capability: Capabilities, enabled: bool) -> Self {
        self.capabilities.set(capability, enabled);
        self
    }

    /// Set the per-column filter kind.
    #[must_use]
    pub fn filter(mut self, filter: FilterKind) -> Self {
        self.filter = filter;
        self
    }

    /// Set the comparator kind.
    #[must_use]
    pub fn sort(mut self, sort: SortKind) -> Self {
        self.sort = sort;
        self
    }

    /// Set the group-row aggregation.
    #[must_use]
    pub fn aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Set the size bounds.
    #[must_use]
    pub fn size(mut self, size: SizeBounds) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Header text, falling back to the id.
    #[must_use]
    pub fn header_text(&self) -> &str {
        self.header.as_deref().unwrap_or(&self.id)
    }

    #[must_use]
    pub fn accessor(&self) -> &Accessor<R> {
        &self.accessor
    }

    #[must_use]
    pub fn caps(&self) -> Capabilities {
        self.capabilities
    }

    #[must_use]
    pub fn filter_kind(&self) -> &FilterKind {
        &self.filter
    }

    #[must_use]
    pub fn sort_kind(&self) -> &SortKind {
        &self.sort
    }

    #[must_use]
    pub fn aggregation_kind(&self) -> Aggregation {
        self.aggregation
    }

    #[must_use]
    pub fn size_bounds(&self) -> SizeBounds {
        self.size
    }

    /// Evaluate this column for a record.
    pub fn value(&self, record: &R) -> CellValue {
        self.accessor.evaluate(record)
    }
}

impl<R> Clone for ColumnDescriptor<R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            header: self.header.clone(),
            accessor: self.accessor.clone(),
            capabilities: self.capabilities,
            filter: self.filter.clone(),
            sort: self.sort.clone(),
            aggregation: self.aggregation,
            size: self.size,
        }
    }
}

impl<R> fmt::Debug for ColumnDescriptor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDescriptor")
            .field("id", &self.id)
            .field("header", &self.header)
            .field("accessor", &self.accessor)
            .field("capabilities", &self.capabilities)
            .field("filter", &self.filter)
            .field("sort", &self.sort)
            .field("aggregation", &self.aggregation)
            .field("size", &self.size)
            .finish()
    }
}

/// Validated, ordered set of column descriptors.
pub struct ColumnRegistry<R> {
    columns: Vec<ColumnDescriptor<R>>,
    index: HashMap<String, usize>,
}

impl<R> ColumnRegistry<R> {
    /// Validate and normalize a list of descriptors.
    ///
    /// Rejects empty ids, duplicate ids, and bounds with `min > max`. A
    /// preferred size outside `[min, max]` is clamped rather than rejected.
    pub fn new(columns: Vec<ColumnDescriptor<R>>) -> Result<Self, ColumnError> {
        let mut index = HashMap::with_capacity(columns.len());
        let mut normalized = Vec::with_capacity(columns.len());

        for (position, mut column) in columns.into_iter().enumerate() {
            if column.id.is_empty() {
                return Err(ColumnError::EmptyId { position });
            }
            if index.contains_key(&column.id) {
                return Err(ColumnError::DuplicateId(column.id));
            }
            let SizeBounds { min, preferred, max } = column.size;
            if min > max {
                return Err(ColumnError::InvalidSizeBounds {
                    id: column.id,
                    min,
                    max,
                });
            }
            column.size.preferred = preferred.clamp(min, max);
            index.insert(column.id.clone(), position);
            normalized.push(column);
        }

        tracing::debug!(columns = normalized.len(), "column registry built");
        Ok(Self {
            columns: normalized,
            index,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|c| c.id.as_str())
    }

    /// Descriptors in registration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDescriptor<R>] {
        &self.columns
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ColumnDescriptor<R>> {
        self.index.get(id).map(|&i| &self.columns[i])
    }

    /// Registration position of a column.
    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Whether the column exists and has every capability in `caps`.
    #[must_use]
    pub fn can(&self, id: &str, caps: Capabilities) -> bool {
        self.get(id).is_some_and(|c| c.capabilities.contains(caps))
    }

    /// Clamp a width for a column, or `None` if the column is unknown.
    #[must_use]
    pub fn clamp_size(&self, id: &str, size: f64) -> Option<f64> {
        self.get(id).map(|c| c.size.clamp(size))
    }

    /// Header text for a column, falling back to its id.
    #[must_use]
    pub fn header(&self, id: &str) -> Option<&str> {
        self.get(id).map(ColumnDescriptor::header_text)
    }
}

impl<R> Clone for ColumnRegistry<R> {
    fn clone(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            index: self.index.clone(),
        }
    }
}

impl<R> fmt::Debug for ColumnRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnRegistry")
            .field("columns", &self.columns)
            .finish()
    }
}
