#![forbid(unsafe_code)]

//! Intents and the state reducer.
//!
//! Every state change is an [`Intent`] applied by [`reduce`], a pure function
//! of the previous state and a [`ReduceContext`] describing the current row
//! model. The caller normalizes and re-derives afterwards.

use tabula_core::{
    Capabilities, ColumnFilter, ColumnRegistry, FilterValue, PinSide, RowId, SortEntry,
    TableState, page_count,
};

use crate::layout::move_column;
use crate::selection::{self, SelectAllScope};

/// A request to change the table state.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Set the global filter text. An empty string clears it.
    SetGlobalFilter(String),
    /// Set or clear (`None`) one column's filter.
    SetColumnFilter {
        column: String,
        value: Option<FilterValue>,
    },
    /// Clear every column filter and the global filter.
    ClearFilters,
    /// Cycle a column through ascending, descending, and unsorted.
    ToggleSort { column: String, multi: bool },
    SetSorting(Vec<SortEntry>),
    ClearSorting,
    SetPage(usize),
    NextPage,
    PreviousPage,
    FirstPage,
    LastPage,
    /// Change the page size, keeping the first visible row on screen.
    SetPageSize(usize),
    ToggleRowSelected(RowId),
    SetRowSelected { id: RowId, selected: bool },
    SelectAll { scope: SelectAllScope, selected: bool },
    ClearSelection,
    ToggleExpanded(RowId),
    ExpandAll,
    CollapseAll,
    SetGrouping(Vec<String>),
    /// Add a column to the end of the grouping, or remove it.
    ToggleGrouping(String),
    SetColumnVisibility { column: String, visible: bool },
    /// Move a column to a position in the column order.
    MoveColumn { column: String, to: usize },
    SetColumnOrder(Vec<String>),
    ResizeColumn { column: String, size: f64 },
    ResetColumnSize(String),
    ResetColumnSizes,
    /// Pin a column to a side, or unpin it with `None`.
    PinColumn { column: String, side: Option<PinSide> },
    /// Return to the table's initial state.
    Reset,
}

impl Intent {
    /// Whether the intent changes which rows match or their order.
    #[must_use]
    pub fn resets_page(&self) -> bool {
        matches!(
            self,
            Intent::SetGlobalFilter(_)
                | Intent::SetColumnFilter { .. }
                | Intent::ClearFilters
                | Intent::ToggleSort { .. }
                | Intent::SetSorting(_)
                | Intent::ClearSorting
                | Intent::SetGrouping(_)
                | Intent::ToggleGrouping(_)
        )
    }
}

/// What the reducer needs to know about the current row model.
pub struct ReduceContext<'a, R> {
    pub registry: &'a ColumnRegistry<R>,
    /// State restored to by [`Intent::Reset`].
    pub initial: &'a TableState,
    /// Filtered leaf ids, across pages.
    pub filtered_leaf_ids: Vec<&'a str>,
    /// Leaf ids on the current page.
    pub page_leaf_ids: Vec<&'a str>,
    /// Every group row id.
    pub group_ids: Vec<&'a str>,
    /// Total used for pagination.
    pub row_count: usize,
    /// Whether a row may be selected.
    pub selectable: &'a dyn Fn(&str) -> bool,
    pub row_selection: bool,
    pub multi_row_selection: bool,
    pub auto_reset_page_index: bool,
}

fn next_sort(current: Option<bool>) -> Option<bool> {
    match current {
        None => Some(false),
        Some(false) => Some(true),
        Some(true) => None,
    }
}

/// Apply one intent, returning the next state.
#[must_use]
pub fn reduce<R>(state: &TableState, intent: &Intent, ctx: &ReduceContext<'_, R>) -> TableState {
    let mut next = state.clone();
    let registry = ctx.registry;

    match intent {
        Intent::SetGlobalFilter(text) => {
            next.global_filter = (!text.is_empty()).then(|| text.clone());
        }
        Intent::SetColumnFilter { column, value } => {
            next.column_filters.retain(|f| f.id != *column);
            if let Some(value) = value.as_ref().filter(|v| !v.is_empty()) {
                if registry.can(column, Capabilities::FILTERABLE) {
                    next.column_filters.push(ColumnFilter::new(column.clone(), value.clone()));
                }
            }
        }
        Intent::ClearFilters => {
            next.column_filters.clear();
            next.global_filter = None;
        }
        Intent::ToggleSort { column, multi } => {
            if registry.can(column, Capabilities::SORTABLE) {
                let direction = next_sort(state.sort_direction(column));
                if *multi {
                    match direction {
                        Some(desc) => match next.sorting.iter_mut().find(|s| s.id == *column) {
                            Some(entry) => entry.desc = desc,
                            None => next.sorting.push(SortEntry { id: column.clone(), desc }),
                        },
                        None => next.sorting.retain(|s| s.id != *column),
                    }
                } else {
                    next.sorting = direction
                        .map(|desc| vec![SortEntry { id: column.clone(), desc }])
                        .unwrap_or_default();
                }
            }
        }
        Intent::SetSorting(sorting) => next.sorting = sorting.clone(),
        Intent::ClearSorting => next.sorting.clear(),
        Intent::SetPage(index) => next.pagination.page_index = *index,
        Intent::NextPage => {
            let last = page_count(ctx.row_count, next.pagination.page_size).saturating_sub(1);
            next.pagination.page_index = (next.pagination.page_index + 1).min(last);
        }
        Intent::PreviousPage => {
            next.pagination.page_index = next.pagination.page_index.saturating_sub(1);
        }
        Intent::FirstPage => next.pagination.page_index = 0,
        Intent::LastPage => {
            next.pagination.page_index =
                page_count(ctx.row_count, next.pagination.page_size).saturating_sub(1);
        }
        Intent::SetPageSize(size) => {
            let size = (*size).max(1);
            let top = state.pagination.page_index * state.pagination.page_size;
            next.pagination.page_size = size;
            next.pagination.page_index = top / size;
        }
        Intent::ToggleRowSelected(id) => {
            let selected = !state.row_selection.contains(id);
            next.row_selection = select_one(state, id, selected, ctx);
        }
        Intent::SetRowSelected { id, selected } => {
            next.row_selection = select_one(state, id, *selected, ctx);
        }
        Intent::SelectAll { scope, selected } => {
            if ctx.row_selection && (ctx.multi_row_selection || !*selected) {
                let population = match scope {
                    SelectAllScope::Filtered => &ctx.filtered_leaf_ids,
                    SelectAllScope::Page => &ctx.page_leaf_ids,
                };
                let ids = population.iter().copied().filter(|id| !*selected || (ctx.selectable)(*id));
                next.row_selection = selection::toggle_all(&state.row_selection, ids, *selected);
            } else {
                tracing::debug!(?scope, "select-all ignored by selection mode");
            }
        }
        Intent::ClearSelection => next.row_selection.clear(),
        Intent::ToggleExpanded(id) => next.expanded = selection::toggle(&state.expanded, id),
        Intent::ExpandAll => {
            next.expanded = selection::expand_all(&state.expanded, ctx.group_ids.iter().copied());
        }
        Intent::CollapseAll => next.expanded = selection::collapse_all(),
        Intent::SetGrouping(grouping) => next.grouping = grouping.clone(),
        Intent::ToggleGrouping(column) => {
            if next.grouping.iter().any(|g| g == column) {
                next.grouping.retain(|g| g != column);
            } else if registry.can(column, Capabilities::GROUPABLE) {
                next.grouping.push(column.clone());
            }
        }
        Intent::SetColumnVisibility { column, visible } => {
            if registry.contains(column) {
                next.column_visibility.insert(column.clone(), *visible);
            }
        }
        Intent::MoveColumn { column, to } => {
            next.column_order = move_column(&state.column_order, column, *to);
        }
        Intent::SetColumnOrder(order) => next.column_order = order.clone(),
        Intent::ResizeColumn { column, size } => {
            if registry.can(column, Capabilities::RESIZABLE) {
                if let Some(clamped) = registry.clamp_size(column, *size) {
                    next.column_sizing.insert(column.clone(), clamped);
                }
            }
        }
        Intent::ResetColumnSize(column) => {
            next.column_sizing.remove(column);
        }
        Intent::ResetColumnSizes => next.column_sizing.clear(),
        Intent::PinColumn { column, side } => {
            if side.is_none() || registry.can(column, Capabilities::PINNABLE) {
                next.column_pinning.pin(column, *side);
            }
        }
        Intent::Reset => next = ctx.initial.clone(),
    }

    if ctx.auto_reset_page_index && intent.resets_page() && next != *state {
        next.pagination.page_index = 0;
    }
    next
}

fn select_one<R>(
    state: &TableState,
    id: &str,
    selected: bool,
    ctx: &ReduceContext<'_, R>,
) -> tabula_core::IdSet {
    let group = ctx.group_ids.contains(&id);
    if !ctx.row_selection || (selected && (group || !(ctx.selectable)(id))) {
        tracing::debug!(row_id = id, "row selection change rejected");
        return state.row_selection.clone();
    }
    if ctx.multi_row_selection {
        selection::set_selected(&state.row_selection, id, selected)
    } else {
        selection::set_selected_single(&state.row_selection, id, selected)
    }
}
