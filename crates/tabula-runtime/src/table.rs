#![forbid(unsafe_code)]

//! The table owner.
//!
//! [`Table`] holds the source records, the column registry, the current
//! [`TableState`], and the derived [`RowModel`]. Every change goes through
//! [`Table::dispatch`], which applies one [`Intent`] atomically:
//!
//! 1. reduce the state with the intent,
//! 2. normalize it against the registry,
//! 3. re-derive the row model,
//! 4. write the clamped page index back,
//! 5. persist the state and, in server mode, fetch the new page.
//!
//! State layering at construction is `defaults <- persisted <- overrides`.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tabula_core::{
    ColumnRegistry, RowIdResolver, StateRestoreError, TableConfig, TableState, merge_fields,
};
use tabula_model::selection::{self, SelectAllScope};
use tabula_model::{ColumnLayout, Intent, Pipeline, ReduceContext, RowModel, reduce};
use tabula_virtual::{Align, SizeEstimator, Window, WindowCalculator};

use crate::export::{ExportSink, ExportSnapshot};
use crate::options::{PersistenceMode, TableOptions};
use crate::port::{PersistenceWriteError, TableStatePort};
use crate::source::{DataSource, FetchCoordinator, FetchRequest, FetchResponse, FetchStatus};
use crate::writer::BackgroundWriter;

/// Decides whether a row id may be selected.
pub type SelectablePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Builder for [`Table`].
pub struct TableBuilder<R> {
    registry: ColumnRegistry<R>,
    records: Vec<R>,
    resolver: RowIdResolver<R>,
    config: TableConfig,
    options: TableOptions,
    port: Option<TableStatePort>,
    overrides: Option<Value>,
    selectable: Option<SelectablePredicate>,
    source: Option<Arc<dyn DataSource<R>>>,
    estimator: Option<SizeEstimator>,
}

impl<R: Send + 'static> TableBuilder<R> {
    #[must_use]
    pub fn new(registry: ColumnRegistry<R>) -> Self {
        Self {
            registry,
            records: Vec::new(),
            resolver: RowIdResolver::default(),
            config: TableConfig::default(),
            options: TableOptions::default(),
            port: None,
            overrides: None,
            selectable: None,
            source: None,
            estimator: None,
        }
    }

    #[must_use]
    pub fn records(mut self, records: Vec<R>) -> Self {
        self.records = records;
        self
    }

    #[must_use]
    pub fn row_id(mut self, resolver: RowIdResolver<R>) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn config(mut self, config: TableConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn options(mut self, options: TableOptions) -> Self {
        self.options = options;
        self
    }

    /// Persist state through `port` (when `config.persist` is on).
    #[must_use]
    pub fn persistence(mut self, port: TableStatePort) -> Self {
        self.port = Some(port);
        self
    }

    /// State fields that override both defaults and persisted state. Uses the
    /// persisted blob format.
    #[must_use]
    pub fn initial_state(mut self, overrides: Value) -> Self {
        self.overrides = Some(overrides);
        self
    }

    #[must_use]
    pub fn selectable(mut self, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.selectable = Some(Arc::new(predicate));
        self
    }

    /// Serve rows from a server. Turns on every manual stage.
    #[must_use]
    pub fn source(mut self, source: Arc<dyn DataSource<R>>) -> Self {
        self.source = Some(source);
        self
    }

    /// Per-row size estimate for virtualization. Defaults to
    /// `config.estimate_size` for every row.
    #[must_use]
    pub fn size_estimator(mut self, estimator: SizeEstimator) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn build(self) -> Table<R> {
        let Self {
            registry,
            records,
            resolver,
            config,
            mut options,
            port,
            overrides,
            selectable,
            source,
            estimator,
        } = self;

        let defaults = TableState::with_page_size(config.page_size).normalized(&registry);
        let mut restore_issues = Vec::new();

        let mut initial = defaults.clone();
        if let Some(overrides) = &overrides {
            restore_issues.extend(merge_fields(&mut initial, overrides));
            initial.normalize(&registry);
        }

        let port = port.filter(|_| config.persist);
        let mut state = defaults;
        let loaded = port
            .as_ref()
            .and_then(|p| p.load(&config.storage_key, state.clone(), &registry));
        if let Some(restored) = loaded {
            state = restored.state;
            restore_issues.extend(restored.issues);
        }
        if let Some(overrides) = &overrides {
            let _ = merge_fields(&mut state, overrides);
            state.normalize(&registry);
        }

        let writer = match (&port, options.persistence) {
            (Some(port), PersistenceMode::Background) => match BackgroundWriter::spawn(port.clone())
            {
                Ok(writer) => Some(writer),
                Err(error) => {
                    tracing::warn!(%error, "state writer thread unavailable; writing inline");
                    None
                }
            },
            _ => None,
        };

        if source.is_some() {
            options.manual_pagination = true;
            options.manual_sorting = true;
            options.manual_filtering = true;
        }

        let estimator = estimator.unwrap_or_else(|| {
            let estimate = config.estimate_size;
            Arc::new(move |_: usize| estimate)
        });
        let window = WindowCalculator::with_estimator(0, estimator, config.overscan);

        let mut pipeline = Pipeline::new();
        let model = pipeline.derive(&records, 0, &registry, &resolver, &state, &options.pipeline());

        let mut table = Table {
            records,
            data_generation: 0,
            registry,
            resolver,
            config,
            options,
            pipeline,
            model,
            state,
            initial,
            port,
            writer,
            warnings: Vec::new(),
            restore_issues,
            selectable: selectable.unwrap_or_else(|| Arc::new(|_: &str| true)),
            window,
            window_rows: Vec::new(),
            source: source.map(FetchCoordinator::new),
        };
        table.rederive();
        tracing::debug!(
            rows = table.records.len(),
            columns = table.registry.len(),
            restore_issues = table.restore_issues.len(),
            server = table.source.is_some(),
            "table built"
        );
        if table.source.is_some() {
            table.request_fetch();
        }
        table
    }
}

/// Owner of one table's records, state, and derived rows.
pub struct Table<R> {
    records: Vec<R>,
    data_generation: u64,
    registry: ColumnRegistry<R>,
    resolver: RowIdResolver<R>,
    config: TableConfig,
    options: TableOptions,
    pipeline: Pipeline,
    model: RowModel,
    state: TableState,
    initial: TableState,
    port: Option<TableStatePort>,
    writer: Option<BackgroundWriter>,
    warnings: Vec<PersistenceWriteError>,
    restore_issues: Vec<StateRestoreError>,
    selectable: SelectablePredicate,
    window: WindowCalculator,
    /// Page row ids the window's measurements belong to.
    window_rows: Vec<String>,
    source: Option<FetchCoordinator<R>>,
}

impl<R> fmt::Debug for Table<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("rows", &self.records.len())
            .field("data_generation", &self.data_generation)
            .field("state", &self.state)
            .field("options", &self.options)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl<R: Send + 'static> Table<R> {
    #[must_use]
    pub fn builder(registry: ColumnRegistry<R>) -> TableBuilder<R> {
        TableBuilder::new(registry)
    }

    #[must_use]
    pub fn state(&self) -> &TableState {
        &self.state
    }

    /// State restored by [`Intent::Reset`]: defaults plus overrides.
    #[must_use]
    pub fn initial_state(&self) -> &TableState {
        &self.initial
    }

    #[must_use]
    pub fn model(&self) -> &RowModel {
        &self.model
    }

    #[must_use]
    pub fn records(&self) -> &[R] {
        &self.records
    }

    #[must_use]
    pub fn registry(&self) -> &ColumnRegistry<R> {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    #[must_use]
    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    /// Problems found while restoring persisted state and overrides.
    #[must_use]
    pub fn restore_issues(&self) -> &[StateRestoreError] {
        &self.restore_issues
    }

    /// Pipeline recompute counters.
    #[must_use]
    pub fn pipeline_stats(&self) -> tabula_model::PipelineStats {
        self.pipeline.stats()
    }

    #[must_use]
    pub fn layout(&self) -> ColumnLayout {
        ColumnLayout::compute(&self.registry, &self.state)
    }

    /// Apply one intent. Returns `false` when the state did not change.
    pub fn dispatch(&mut self, intent: Intent) -> bool {
        let next = {
            let ctx = ReduceContext {
                registry: &self.registry,
                initial: &self.initial,
                filtered_leaf_ids: self.model.leaf_ids(),
                page_leaf_ids: self.model.page_leaf_ids(),
                group_ids: self.model.group_ids(),
                row_count: self.model.row_count(),
                selectable: &*self.selectable,
                row_selection: self.config.row_selection,
                multi_row_selection: self.config.multi_row_selection,
                auto_reset_page_index: self.config.auto_reset_page_index,
            };
            reduce(&self.state, &intent, &ctx).normalized(&self.registry)
        };
        if next == self.state {
            tracing::trace!(?intent, "intent left state unchanged");
            return false;
        }

        let previous = std::mem::replace(&mut self.state, next);
        self.rederive();
        if self.state == previous {
            tracing::trace!(?intent, "intent clamped back to the current state");
            return false;
        }

        let refetch = self.source.is_some()
            && FetchRequest::from_state(&self.state) != FetchRequest::from_state(&previous);
        self.persist();
        tracing::debug!(
            ?intent,
            page_index = self.state.pagination.page_index,
            rows = self.model.row_count(),
            "intent applied"
        );
        if refetch {
            self.request_fetch();
        }
        true
    }

    /// Replace the source records.
    ///
    /// Selected ids that no longer resolve to a row are dropped, except under
    /// manual pagination where the records are only one page of a larger set.
    /// A clamped page or pruned selection is persisted.
    pub fn set_data(&mut self, records: Vec<R>) {
        self.records = records;
        self.data_generation += 1;
        let clamped = self.rederive();
        let pruned = !self.options.manual_pagination && self.prune_selection();
        if clamped || pruned {
            self.persist();
        }
    }

    /// Return to the initial state and forget the persisted entry.
    pub fn reset(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush();
        }
        if let Some(port) = &self.port
            && let Err(error) = port.remove(&self.config.storage_key)
        {
            tracing::warn!(%error, "could not clear persisted table state");
            self.warnings.push(error);
        }
        self.state = self.initial.clone();
        self.rederive();
        tracing::debug!("table reset");
        if self.source.is_some() {
            self.request_fetch();
        }
    }

    /// Write failures since the last call, from both inline and background
    /// writes.
    pub fn persistence_warnings(&mut self) -> Vec<PersistenceWriteError> {
        let mut warnings = std::mem::take(&mut self.warnings);
        if let Some(writer) = &self.writer {
            warnings.extend(writer.drain_warnings());
        }
        warnings
    }

    /// Block until background writes are on storage.
    pub fn flush_persistence(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush();
        }
    }

    #[must_use]
    pub fn is_row_selected(&self, id: &str) -> bool {
        selection::is_selected(&self.state.row_selection, id)
    }

    /// Every selectable row of the scope is selected.
    #[must_use]
    pub fn is_all_selected(&self, scope: SelectAllScope) -> bool {
        selection::is_all_selected(&self.state.row_selection, self.scope_ids(scope))
    }

    #[must_use]
    pub fn is_some_selected(&self, scope: SelectAllScope) -> bool {
        selection::is_some_selected(&self.state.row_selection, self.scope_ids(scope))
    }

    /// Selected rows within the scope.
    #[must_use]
    pub fn selected_count(&self, scope: SelectAllScope) -> usize {
        selection::selected_count(&self.state.row_selection, self.scope_ids(scope))
    }

    /// Snapshot for export: visible columns, selected or filtered rows.
    #[must_use]
    pub fn export_snapshot(&self) -> ExportSnapshot {
        ExportSnapshot::capture(&self.registry, &self.state, &self.model)
    }

    pub fn export<S: ExportSink>(&self, sink: &S) -> Result<S::Artifact, S::Error> {
        sink.export(&self.export_snapshot())
    }

    /// Virtualization window over the rows of the current page.
    pub fn window(&mut self, container: u64, scroll: u64) -> &Window {
        self.window.window(container, scroll)
    }

    /// Record the rendered size of a page row.
    pub fn measure_row(&mut self, index: usize, size: u32) -> bool {
        self.window.measure(index, size)
    }

    /// Scroll offset that brings a page row into view.
    #[must_use]
    pub fn scroll_offset_for(&self, index: usize, align: Align, container: u64, current: u64) -> u64 {
        self.window.offset_for_index(index, align, container, current)
    }

    #[must_use]
    pub fn fetch_status(&self) -> Option<&FetchStatus> {
        self.source.as_ref().map(FetchCoordinator::status)
    }

    /// Fetch the current page again.
    pub fn refresh(&mut self) {
        if self.source.is_some() {
            self.request_fetch();
        }
    }

    /// Apply finished background fetches. Returns `true` when new rows were
    /// applied.
    pub fn poll_fetches(&mut self) -> bool {
        let Some(source) = self.source.as_mut() else {
            return false;
        };
        match source.poll() {
            Some(response) => {
                self.apply_response(response);
                true
            }
            None => false,
        }
    }

    /// Block until the latest background fetch finishes and apply it.
    pub fn wait_for_fetch(&mut self) -> bool {
        let Some(source) = self.source.as_mut() else {
            return false;
        };
        match source.wait() {
            Some(response) => {
                self.apply_response(response);
                true
            }
            None => false,
        }
    }

    fn scope_ids(&self, scope: SelectAllScope) -> Vec<&str> {
        let ids = match scope {
            SelectAllScope::Filtered => self.model.leaf_ids(),
            SelectAllScope::Page => self.model.page_leaf_ids(),
        };
        ids.into_iter().filter(|id| (self.selectable)(id)).collect()
    }

    /// Re-derive and write the clamped pagination back. Returns `true` when
    /// the page index or size had to be clamped.
    fn rederive(&mut self) -> bool {
        self.model = self.pipeline.derive(
            &self.records,
            self.data_generation,
            &self.registry,
            &self.resolver,
            &self.state,
            &self.options.pipeline(),
        );
        self.sync_window();
        let clamped = self.model.pagination();
        if clamped == self.state.pagination {
            return false;
        }
        tracing::debug!(
            from = self.state.pagination.page_index,
            to = clamped.page_index,
            "page index clamped"
        );
        self.state.pagination = clamped;
        true
    }

    fn sync_window(&mut self) {
        let rows = self.model.page_row_ids();
        if rows.iter().copied().eq(self.window_rows.iter().map(String::as_str)) {
            return;
        }
        self.window.set_row_count(rows.len());
        self.window.reset_measurements();
        self.window_rows = rows.into_iter().map(str::to_owned).collect();
    }

    /// Returns `true` when any selected id was dropped.
    fn prune_selection(&mut self) -> bool {
        let (kept, removed) = selection::prune(
            &self.state.row_selection,
            self.model.ids().iter().map(String::as_str),
        );
        if removed == 0 {
            return false;
        }
        tracing::debug!(removed, "dropped selection of rows no longer present");
        self.state.row_selection = kept;
        true
    }

    fn persist(&mut self) {
        if !self.config.persist {
            return;
        }
        let Some(port) = &self.port else {
            return;
        };
        let key = &self.config.storage_key;
        match &self.writer {
            Some(writer) => writer.submit(key, self.state.clone()),
            None => {
                if let Err(error) = port.save(key, &self.state) {
                    tracing::warn!(%error, "table state not persisted");
                    self.warnings.push(error);
                }
            }
        }
    }

    fn request_fetch(&mut self) {
        let request = FetchRequest::from_state(&self.state);
        let Some(source) = self.source.as_mut() else {
            return;
        };
        if self.options.background_fetch {
            let ticket = source.spawn(request);
            tracing::debug!(ticket, "fetch requested");
        } else if let Some(response) = source.fetch_blocking(&request) {
            self.apply_response(response);
        }
    }

    fn apply_response(&mut self, response: FetchResponse<R>) {
        self.options.row_count = Some(response.total_count);
        self.records = response.rows;
        self.data_generation += 1;
        if self.rederive() {
            self.persist();
            self.request_fetch();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabula_core::{ColumnDescriptor, FilterKind, FilterValue, SortEntry};

    fn registry() -> ColumnRegistry<Value> {
        ColumnRegistry::new(vec![
            ColumnDescriptor::field("id"),
            ColumnDescriptor::field("title").filter(FilterKind::Text),
            ColumnDescriptor::field("status"),
        ])
        .unwrap()
    }

    fn records(n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| json!({"id": i, "title": format!("task {i}"), "status": if i % 2 == 0 { "todo" } else { "done" }}))
            .collect()
    }

    fn table(n: usize) -> Table<Value> {
        Table::builder(registry())
            .records(records(n))
            .row_id(RowIdResolver::custom(|r: &Value, _| r["id"].to_string()))
            .build()
    }

    #[test]
    fn filter_change_resets_the_page() {
        let mut t = table(50);
        assert!(t.dispatch(Intent::SetPage(3)));
        assert_eq!(t.state().pagination.page_index, 3);
        t.dispatch(Intent::SetColumnFilter {
            column: "status".into(),
            value: Some(FilterValue::from("todo")),
        });
        assert_eq!(t.state().pagination.page_index, 0);
        assert_eq!(t.model().row_count(), 25);
    }

    #[test]
    fn unchanged_state_is_not_reapplied() {
        let mut t = table(5);
        assert!(!t.dispatch(Intent::FirstPage));
        assert!(!t.dispatch(Intent::ClearSorting));
        assert!(!t.dispatch(Intent::SetPage(7)));
        assert_eq!(t.state().pagination.page_index, 0);
    }

    #[test]
    fn page_clamped_by_new_data_is_persisted() {
        let port = TableStatePort::in_memory();
        let mut t = Table::builder(registry())
            .records(records(30))
            .persistence(port.clone())
            .build();
        t.dispatch(Intent::LastPage);
        t.set_data(records(12));
        assert_eq!(t.state().pagination.page_index, 1);

        let stored = port
            .load("data-table-state", TableState::default(), &registry())
            .unwrap();
        assert_eq!(stored.state.pagination.page_index, 1);
    }

    #[test]
    fn shrinking_data_clamps_page_and_prunes_selection() {
        let mut t = table(30);
        t.dispatch(Intent::LastPage);
        t.dispatch(Intent::SetRowSelected {
            id: "29".into(),
            selected: true,
        });
        t.dispatch(Intent::SetRowSelected {
            id: "1".into(),
            selected: true,
        });
        t.set_data(records(12));
        assert_eq!(t.state().pagination.page_index, 1);
        assert!(t.is_row_selected("1"));
        assert!(!t.is_row_selected("29"));
        assert_eq!(t.model().page_len(), 2);
    }

    #[test]
    fn unselectable_rows_are_skipped_by_select_all() {
        let mut t = Table::builder(registry())
            .records(records(10))
            .selectable(|id| id != "0")
            .build();
        t.dispatch(Intent::SelectAll {
            scope: SelectAllScope::Page,
            selected: true,
        });
        assert!(!t.is_row_selected("0"));
        assert_eq!(t.selected_count(SelectAllScope::Page), 9);
        assert!(t.is_all_selected(SelectAllScope::Page));
    }

    #[test]
    fn overrides_layer_over_defaults_and_reset_returns_to_them() {
        let mut t = Table::builder(registry())
            .records(records(10))
            .initial_state(json!({"sorting": [{"id": "id", "desc": true}]}))
            .build();
        assert_eq!(t.state().sorting, vec![SortEntry::desc("id")]);
        t.dispatch(Intent::ClearSorting);
        assert!(t.state().sorting.is_empty());
        t.reset();
        assert_eq!(t.state().sorting, vec![SortEntry::desc("id")]);
    }

    #[test]
    fn window_tracks_page_rows() {
        let mut t = Table::builder(registry())
            .records(records(100))
            .config(TableConfig::default().page_size(50).estimate_size(20).overscan(0))
            .build();
        let w = t.window(100, 0).clone();
        assert_eq!(w.range, 0..5);
        assert_eq!(w.total, 50 * 20);
        assert!(t.measure_row(0, 40));
        assert_eq!(t.window(100, 0).range, 0..4);
        assert_eq!(t.scroll_offset_for(49, Align::Start, 100, 0), 1020 - 100);
    }
}
