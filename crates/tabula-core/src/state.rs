#![forbid(unsafe_code)]

//! The table state aggregate.
//!
//! [`TableState`] is the single value that intents transform, the pipeline
//! reads, and the persistence port mirrors. Its serde form is the persisted
//! blob (camelCase keys, id sets as `{id: true}` maps).
//!
//! # Invariants
//!
//! After [`TableState::normalize`]:
//!
//! 1. Every column id in `sorting`, `column_filters`, `grouping`,
//!    `column_pinning`, `column_sizing`, and `column_visibility` exists in the
//!    registry and carries the relevant capability.
//! 2. `sorting`, `column_filters`, and `grouping` hold at most one entry per
//!    column.
//! 3. `column_order` is a permutation of the registry ids.
//! 4. A column is pinned on at most one side.
//! 5. `pagination.page_size > 0`.
//! 6. Column sizes lie within each column's bounds.
//!
//! Selection and expansion sets are not touched here. Stale ids are pruned
//! against the current id universe when the data changes.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::column::{Capabilities, ColumnRegistry};
use crate::identity::RowId;

/// Default rows per page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortEntry {
    pub id: String,
    pub desc: bool,
}

impl SortEntry {
    #[must_use]
    pub fn asc(id: impl Into<String>) -> Self {
        Self { id: id.into(), desc: false }
    }

    #[must_use]
    pub fn desc(id: impl Into<String>) -> Self {
        Self { id: id.into(), desc: true }
    }
}

/// Value of a per-column filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Substring or single-value match.
    Text(String),
    /// Set of accepted values.
    Set(Vec<String>),
}

impl FilterValue {
    /// An empty filter value imposes no constraint.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            FilterValue::Text(s) => s.is_empty(),
            FilterValue::Set(v) => v.is_empty(),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_owned())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(v: Vec<String>) -> Self {
        FilterValue::Set(v)
    }
}

/// A per-column filter entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFilter {
    pub id: String,
    pub value: FilterValue,
}

impl ColumnFilter {
    #[must_use]
    pub fn new(id: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// Current page position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page_index: usize,
    pub page_size: usize,
}

impl Pagination {
    #[must_use]
    pub fn new(page_index: usize, page_size: usize) -> Self {
        Self { page_index, page_size }
    }

    /// Number of pages for `total` rows.
    #[must_use]
    pub fn page_count(&self, total: usize) -> usize {
        page_count(total, self.page_size)
    }

    /// Clamp the page index to `[0, max(page_count - 1, 0)]`.
    #[must_use]
    pub fn clamped(self, total: usize) -> Self {
        let last = self.page_count(total).saturating_sub(1);
        Self {
            page_index: self.page_index.min(last),
            ..self
        }
    }

    /// Half-open row range `[start, end)` of the current page within `total`.
    #[must_use]
    pub fn range(&self, total: usize) -> std::ops::Range<usize> {
        let start = self.page_index.saturating_mul(self.page_size).min(total);
        let end = start.saturating_add(self.page_size).min(total);
        start..end
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_SIZE)
    }
}

/// `ceil(total / page_size)`, or 0 when there are no rows.
#[must_use]
pub fn page_count(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

/// Left/right pinned column ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPinning {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub left: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub right: Vec<String>,
}

/// Side a column is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinSide {
    Left,
    Right,
}

impl ColumnPinning {
    /// Side the column is pinned to, if any.
    #[must_use]
    pub fn side_of(&self, id: &str) -> Option<PinSide> {
        if self.left.iter().any(|c| c == id) {
            Some(PinSide::Left)
        } else if self.right.iter().any(|c| c == id) {
            Some(PinSide::Right)
        } else {
            None
        }
    }

    /// Pin a column to a side, or unpin it with `None`.
    pub fn pin(&mut self, id: &str, side: Option<PinSide>) {
        self.left.retain(|c| c != id);
        self.right.retain(|c| c != id);
        match side {
            Some(PinSide::Left) => self.left.push(id.to_owned()),
            Some(PinSide::Right) => self.right.push(id.to_owned()),
            None => {}
        }
    }
}

/// A set of row ids. Serialized as `{id: true}`; `false` entries are dropped
/// on read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSet(BTreeSet<RowId>);

impl IdSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Returns `true` if the id was newly inserted.
    pub fn insert(&mut self, id: impl Into<RowId>) -> bool {
        self.0.insert(id.into())
    }

    /// Returns `true` if the id was present.
    pub fn remove(&mut self, id: &str) -> bool {
        self.0.remove(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(String::as_str)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.0.retain(|id| keep(id));
    }
}

impl<S: Into<RowId>> FromIterator<S> for IdSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<RowId>> Extend<S> for IdSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(Into::into));
    }
}

impl Serialize for IdSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for id in &self.0 {
            map.serialize_entry(id, &true)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for IdSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdSetVisitor;

        impl<'de> Visitor<'de> for IdSetVisitor {
            type Value = IdSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of row id to boolean")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<IdSet, A::Error> {
                let mut set = IdSet::new();
                while let Some((id, flag)) = access.next_entry::<String, bool>()? {
                    if flag {
                        set.insert(id);
                    }
                }
                Ok(set)
            }

            fn visit_unit<E: de::Error>(self) -> Result<IdSet, E> {
                Ok(IdSet::new())
            }
        }

        deserializer.deserialize_map(IdSetVisitor)
    }
}

/// Everything a table needs to re-derive its view, and exactly what is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableState {
    pub sorting: Vec<SortEntry>,
    pub column_filters: Vec<ColumnFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_filter: Option<String>,
    pub column_visibility: BTreeMap<String, bool>,
    pub column_order: Vec<String>,
    pub column_pinning: ColumnPinning,
    pub column_sizing: BTreeMap<String, f64>,
    pub pagination: Pagination,
    pub row_selection: IdSet,
    pub grouping: Vec<String>,
    pub expanded: IdSet,
}

impl Default for TableState {
    fn default() -> Self {
        Self {
            sorting: Vec::new(),
            column_filters: Vec::new(),
            global_filter: None,
            column_visibility: BTreeMap::new(),
            column_order: Vec::new(),
            column_pinning: ColumnPinning::default(),
            column_sizing: BTreeMap::new(),
            pagination: Pagination::default(),
            row_selection: IdSet::new(),
            grouping: Vec::new(),
            expanded: IdSet::new(),
        }
    }
}

impl TableState {
    /// Default state with a given page size.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            pagination: Pagination::new(0, page_size.max(1)),
            ..Self::default()
        }
    }

    /// Active filter value for a column.
    #[must_use]
    pub fn column_filter(&self, id: &str) -> Option<&FilterValue> {
        self.column_filters.iter().find(|f| f.id == id).map(|f| &f.value)
    }

    /// Sort direction for a column: `Some(desc)` when sorted.
    #[must_use]
    pub fn sort_direction(&self, id: &str) -> Option<bool> {
        self.sorting.iter().find(|s| s.id == id).map(|s| s.desc)
    }

    /// Global filter text, treating an empty string as absent.
    #[must_use]
    pub fn global_filter_text(&self) -> Option<&str> {
        self.global_filter.as_deref().filter(|s| !s.is_empty())
    }

    /// Whether a column is visible. Columns without an entry are visible.
    #[must_use]
    pub fn is_visible(&self, id: &str) -> bool {
        self.column_visibility.get(id).copied().unwrap_or(true)
    }

    /// Serialize to the persisted JSON blob.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Bring the state in line with the registry. See the module invariants.
    ///
    /// Idempotent: normalizing a normalized state is a no-op.
    pub fn normalize<R>(&mut self, registry: &ColumnRegistry<R>) {
        let sortable = |id: &str| registry.can(id, Capabilities::SORTABLE);
        let filterable = |id: &str| registry.can(id, Capabilities::FILTERABLE);
        let groupable = |id: &str| registry.can(id, Capabilities::GROUPABLE);
        let pinnable = |id: &str| registry.can(id, Capabilities::PINNABLE);
        let resizable = |id: &str| registry.can(id, Capabilities::RESIZABLE);

        let mut seen = HashSet::new();
        self.sorting
            .retain(|s| sortable(&s.id) && seen.insert(s.id.clone()));

        seen.clear();
        self.column_filters
            .retain(|f| filterable(&f.id) && !f.value.is_empty() && seen.insert(f.id.clone()));

        if self.global_filter.as_deref().is_some_and(str::is_empty) {
            self.global_filter = None;
        }

        seen.clear();
        self.grouping
            .retain(|id| groupable(id) && seen.insert(id.clone()));

        self.column_visibility.retain(|id, _| registry.contains(id));

        seen.clear();
        self.column_order
            .retain(|id| registry.contains(id) && seen.insert(id.clone()));
        for id in registry.ids() {
            if !seen.contains(id) {
                self.column_order.push(id.to_owned());
            }
        }

        seen.clear();
        self.column_pinning
            .left
            .retain(|id| pinnable(id) && seen.insert(id.clone()));
        self.column_pinning
            .right
            .retain(|id| pinnable(id) && seen.insert(id.clone()));

        self.column_sizing.retain(|id, _| resizable(id));
        for (id, size) in &mut self.column_sizing {
            if let Some(clamped) = registry.clamp_size(id, *size) {
                *size = clamped;
            }
        }

        if self.pagination.page_size == 0 {
            self.pagination.page_size = DEFAULT_PAGE_SIZE;
        }
    }

    /// Normalized copy.
    #[must_use]
    pub fn normalized<R>(mut self, registry: &ColumnRegistry<R>) -> Self {
        self.normalize(registry);
        self
    }
}
