#![forbid(unsafe_code)]

//! Row model pipeline.
//!
//! `records + TableState + ColumnRegistry -> RowModel`, in fixed stage order:
//!
//! ```text
//! core -> filter -> group -> sort -> flatten -> paginate
//! ```
//!
//! Each stage consumes only the previous stage's output plus its own slice of
//! the state. [`Pipeline`] memoizes every stage on its input key (upstream
//! generation plus state slice) and bumps the stage's generation when it
//! recomputes, so a page change re-runs only the paginate stage and a data
//! replacement re-runs everything.
//!
//! Stage outputs are shared through `Arc`, so a [`RowModel`] is cheap to
//! clone and stays valid after the pipeline moves on.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;

use tabula_core::{
    CellValue, ColumnFilter, ColumnRegistry, IdSet, Pagination, RowId, RowIdResolver, SortEntry,
    TableState, page_count,
};

use crate::filter::filter_rows;
use crate::group::group_rows;
use crate::rows::{CoreRows, Row, RowKind, RowTree};
use crate::sort::sort_tree;

/// Switches that hand a stage over to the caller (server-side data).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Rows arrive pre-filtered; the filter stage passes everything.
    pub manual_filtering: bool,
    /// Rows arrive pre-sorted; the sort stage keeps input order.
    pub manual_sorting: bool,
    /// Rows are exactly one page; the paginate stage is a no-op.
    pub manual_pagination: bool,
    /// Authoritative total row count under manual pagination.
    pub row_count: Option<usize>,
}

/// Recompute counters per stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub core: u64,
    pub filter: u64,
    pub group: u64,
    pub sort: u64,
    pub flatten: u64,
    pub paginate: u64,
    /// Stage evaluations served from the memo.
    pub hits: u64,
}

/// Effective page after clamping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSlice {
    /// Range into the flattened rows.
    pub range: Range<usize>,
    /// Pagination with the page index clamped to the available pages.
    pub pagination: Pagination,
    pub page_count: usize,
    /// Total used for pagination: flattened length, or the caller's total.
    pub row_count: usize,
}

#[derive(Debug, Default)]
struct SortedRows {
    tree: RowTree,
    leaf_order: Vec<usize>,
}

struct Memo<K, V> {
    key: Option<K>,
    value: Arc<V>,
    generation: u64,
}

impl<K: PartialEq, V: Default> Memo<K, V> {
    fn new() -> Self {
        Self {
            key: None,
            value: Arc::new(V::default()),
            generation: 0,
        }
    }

    /// Return the cached value for `key`, computing it on a miss.
    fn get_or_compute(
        &mut self,
        stage: &'static str,
        key: K,
        counter: &mut u64,
        hits: &mut u64,
        compute: impl FnOnce() -> V,
    ) -> (Arc<V>, u64) {
        if self.key.as_ref() == Some(&key) {
            *hits += 1;
            tracing::trace!(stage, generation = self.generation, "stage memo hit");
        } else {
            self.value = Arc::new(compute());
            self.key = Some(key);
            self.generation += 1;
            *counter += 1;
            tracing::debug!(stage, generation = self.generation, "stage recomputed");
        }
        (Arc::clone(&self.value), self.generation)
    }

    fn clear(&mut self) {
        self.key = None;
    }
}

type FilterKey = (u64, Vec<ColumnFilter>, Option<String>, bool);
type SortKey = (u64, Vec<SortEntry>, bool);
type FlattenKey = (u64, Option<IdSet>);
type PaginateKey = (u64, Pagination, bool, Option<usize>);

/// Memoizing pipeline. One per table.
pub struct Pipeline {
    core: Memo<(u64, usize), CoreRows>,
    filter: Memo<FilterKey, Vec<usize>>,
    group: Memo<(u64, Vec<String>), RowTree>,
    sort: Memo<SortKey, SortedRows>,
    flatten: Memo<FlattenKey, Vec<usize>>,
    paginate: Memo<PaginateKey, PageSlice>,
    stats: PipelineStats,
}

impl Default for PageSlice {
    fn default() -> Self {
        Self {
            range: 0..0,
            pagination: Pagination::default(),
            page_count: 0,
            row_count: 0,
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Memo::new(),
            filter: Memo::new(),
            group: Memo::new(),
            sort: Memo::new(),
            flatten: Memo::new(),
            paginate: Memo::new(),
            stats: PipelineStats::default(),
        }
    }

    /// Recompute counters since construction.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Forget every memoized stage.
    pub fn invalidate(&mut self) {
        self.core.clear();
        self.filter.clear();
        self.group.clear();
        self.sort.clear();
        self.flatten.clear();
        self.paginate.clear();
    }

    /// Derive the row model.
    ///
    /// `data_generation` must change whenever `records` is replaced; the core
    /// stage is keyed on it rather than on the records themselves.
    pub fn derive<R>(
        &mut self,
        records: &[R],
        data_generation: u64,
        registry: &ColumnRegistry<R>,
        resolver: &RowIdResolver<R>,
        state: &TableState,
        options: &PipelineOptions,
    ) -> RowModel {
        let _span = tracing::debug_span!(
            "pipeline_derive",
            rows = records.len(),
            data_generation,
            page_index = state.pagination.page_index
        )
        .entered();
        let stats = &mut self.stats;

        let (core, core_gen) = self.core.get_or_compute(
            "core",
            (data_generation, records.len()),
            &mut stats.core,
            &mut stats.hits,
            || CoreRows {
                ids: resolver.resolve_all(records),
                cells: records
                    .iter()
                    .map(|record| registry.columns().iter().map(|c| c.value(record)).collect())
                    .collect(),
            },
        );

        let global = state.global_filter_text().map(str::to_owned);
        let (filtered, filter_gen) = self.filter.get_or_compute(
            "filter",
            (
                core_gen,
                state.column_filters.clone(),
                global.clone(),
                options.manual_filtering,
            ),
            &mut stats.filter,
            &mut stats.hits,
            || {
                if options.manual_filtering {
                    (0..core.len()).collect()
                } else {
                    filter_rows(&core, registry, &state.column_filters, global.as_deref())
                }
            },
        );

        let (grouped, group_gen) = self.group.get_or_compute(
            "group",
            (filter_gen, state.grouping.clone()),
            &mut stats.group,
            &mut stats.hits,
            || group_rows(&core, registry, &filtered, &state.grouping),
        );

        let (sorted, sort_gen) = self.sort.get_or_compute(
            "sort",
            (group_gen, state.sorting.clone(), options.manual_sorting),
            &mut stats.sort,
            &mut stats.hits,
            || {
                let tree = if options.manual_sorting {
                    (*grouped).clone()
                } else {
                    sort_tree(&core, registry, &grouped, &state.sorting)
                };
                let leaf_order = tree.leaves_in_order();
                SortedRows { tree, leaf_order }
            },
        );

        let has_groups = sorted.tree.arena.iter().any(Row::is_group);
        let expanded_key = has_groups.then(|| state.expanded.clone());
        let (flat, flatten_gen) = self.flatten.get_or_compute(
            "flatten",
            (sort_gen, expanded_key),
            &mut stats.flatten,
            &mut stats.hits,
            || flatten(&sorted.tree, &state.expanded),
        );

        let (page, _) = self.paginate.get_or_compute(
            "paginate",
            (
                flatten_gen,
                state.pagination,
                options.manual_pagination,
                options.row_count,
            ),
            &mut stats.paginate,
            &mut stats.hits,
            || paginate(flat.len(), state.pagination, options),
        );

        RowModel {
            core,
            filtered,
            sorted,
            flat,
            page: (*page).clone(),
        }
    }
}

/// Derive a row model without memoization.
pub fn derive<R>(
    records: &[R],
    state: &TableState,
    registry: &ColumnRegistry<R>,
    resolver: &RowIdResolver<R>,
) -> RowModel {
    Pipeline::new().derive(records, 0, registry, resolver, state, &PipelineOptions::default())
}

/// Depth-first flattening. Children of a group appear only when it is expanded.
#[must_use]
pub fn flatten(tree: &RowTree, expanded: &IdSet) -> Vec<usize> {
    let mut out = Vec::with_capacity(tree.arena.len());
    let mut stack: Vec<usize> = tree.roots.iter().rev().copied().collect();
    while let Some(idx) = stack.pop() {
        out.push(idx);
        let row = &tree.arena[idx];
        if let RowKind::Group(group) = &row.kind {
            if expanded.contains(&row.id) {
                stack.extend(group.children.iter().rev().copied());
            }
        }
    }
    out
}

/// Slice the flattened rows to the current page, clamping the page index.
///
/// Under manual pagination the rows are already one page. The index is
/// clamped against the caller's total, and left alone until a total is known.
#[must_use]
pub fn paginate(flat_len: usize, pagination: Pagination, options: &PipelineOptions) -> PageSlice {
    if options.manual_pagination {
        let Some(total) = options.row_count else {
            return PageSlice {
                range: 0..flat_len,
                pagination,
                page_count: pagination
                    .page_count(flat_len)
                    .max(pagination.page_index + 1),
                row_count: flat_len,
            };
        };
        let clamped = pagination.clamped(total);
        return PageSlice {
            range: 0..flat_len,
            pagination: clamped,
            page_count: page_count(total, clamped.page_size),
            row_count: total,
        };
    }
    let clamped = pagination.clamped(flat_len);
    PageSlice {
        range: clamped.range(flat_len),
        pagination: clamped,
        page_count: page_count(flat_len, clamped.page_size),
        row_count: flat_len,
    }
}

/// Output of one derivation.
#[derive(Debug, Clone)]
pub struct RowModel {
    core: Arc<CoreRows>,
    filtered: Arc<Vec<usize>>,
    sorted: Arc<SortedRows>,
    flat: Arc<Vec<usize>>,
    page: PageSlice,
}

impl RowModel {
    /// Rows on the current page, in display order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> + '_ {
        self.flat[self.page.range.clone()]
            .iter()
            .map(|&idx| &self.sorted.tree.arena[idx])
    }

    /// Every flattened row, across pages.
    pub fn flat_rows(&self) -> impl Iterator<Item = &Row> + '_ {
        self.flat.iter().map(|&idx| &self.sorted.tree.arena[idx])
    }

    /// Cell of a row produced by this model.
    #[must_use]
    pub fn cell<'a>(&'a self, row: &'a Row, column: usize) -> &'a CellValue {
        static NULL: CellValue = CellValue::Null;
        match &row.kind {
            RowKind::Leaf { source_index } => self
                .core
                .cells
                .get(*source_index)
                .and_then(|cells| cells.get(column))
                .unwrap_or(&NULL),
            RowKind::Group(group) => group.aggregates.get(column).unwrap_or(&NULL),
        }
    }

    /// Cells of a record by source index.
    #[must_use]
    pub fn record_cells(&self, source_index: usize) -> Option<&[CellValue]> {
        self.core.cells.get(source_index).map(Vec::as_slice)
    }

    /// Number of rows on the current page.
    #[must_use]
    pub fn page_len(&self) -> usize {
        self.page.range.len()
    }

    /// Flattened row count before pagination, or the caller's total under
    /// manual pagination.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.page.row_count
    }

    /// Length of the flattened sequence held by this model.
    #[must_use]
    pub fn flat_len(&self) -> usize {
        self.flat.len()
    }

    /// Leaves passing the filter stage.
    #[must_use]
    pub fn filtered_leaf_count(&self) -> usize {
        self.filtered.len()
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page.page_count
    }

    /// Pagination after clamping against the current total.
    #[must_use]
    pub fn pagination(&self) -> Pagination {
        self.page.pagination
    }

    /// Ids of the rows on the current page.
    #[must_use]
    pub fn page_row_ids(&self) -> Vec<&str> {
        self.rows().map(|r| r.id.as_str()).collect()
    }

    /// Leaf ids on or beneath the rows of the current page.
    #[must_use]
    pub fn page_leaf_ids(&self) -> Vec<&str> {
        let tree = &self.sorted.tree;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for &idx in &self.flat[self.page.range.clone()] {
            let mut stack = vec![idx];
            while let Some(node) = stack.pop() {
                let row = &tree.arena[node];
                match &row.kind {
                    RowKind::Leaf { .. } => {
                        if seen.insert(node) {
                            out.push(row.id.as_str());
                        }
                    }
                    RowKind::Group(group) => stack.extend(group.children.iter().rev().copied()),
                }
            }
        }
        out
    }

    /// Filtered leaf ids in filtered+sorted order.
    #[must_use]
    pub fn leaf_ids(&self) -> Vec<&str> {
        self.sorted
            .leaf_order
            .iter()
            .map(|&i| self.core.ids[i].as_str())
            .collect()
    }

    /// Filtered leaf source indices in filtered+sorted order.
    #[must_use]
    pub fn leaf_source_indices(&self) -> &[usize] {
        &self.sorted.leaf_order
    }

    /// Every resolved id in source order: the id universe.
    #[must_use]
    pub fn ids(&self) -> &[RowId] {
        &self.core.ids
    }

    /// Ids of every group row.
    #[must_use]
    pub fn group_ids(&self) -> Vec<&str> {
        self.sorted.tree.group_ids()
    }

    #[must_use]
    pub fn is_grouped(&self) -> bool {
        self.sorted.tree.arena.iter().any(Row::is_group)
    }

    /// The sorted row tree.
    #[must_use]
    pub fn tree(&self) -> &RowTree {
        &self.sorted.tree
    }
}
