#![forbid(unsafe_code)]

//! End-to-end persistence tests for [`Table`].
//!
//! # Invariants
//!
//! 1. **Round trip**: a table rebuilt over the same storage sees the state the
//!    previous table left behind.
//! 2. **Lenient restore**: corrupt or partial blobs never fail construction;
//!    the affected fields fall back to defaults and are reported.
//! 3. **Layering**: explicit overrides beat persisted fields.
//! 4. **Non-fatal writes**: storage failures surface as warnings only.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tabula_core::{
    ColumnDescriptor, ColumnRegistry, FilterKind, FilterValue, SortEntry, StateRestoreError,
    TableConfig,
};
use tabula_model::{Intent, SelectAllScope};
use tabula_runtime::{
    MemoryStorage, PersistenceMode, StorageBackend, StorageError, StorageResult, StoredEntry,
    Table, TableOptions, TableStatePort,
};

fn registry() -> ColumnRegistry<Value> {
    ColumnRegistry::new(vec![
        ColumnDescriptor::field("id"),
        ColumnDescriptor::field("title").filter(FilterKind::Text),
        ColumnDescriptor::field("status"),
    ])
    .unwrap()
}

fn records() -> Vec<Value> {
    (0..35)
        .map(|i| json!({"id": i, "title": format!("item {i}"), "status": (["todo", "doing", "done"][i % 3])}))
        .collect()
}

fn build(port: &TableStatePort) -> Table<Value> {
    Table::builder(registry())
        .records(records())
        .persistence(port.clone())
        .build()
}

#[test]
fn state_survives_a_rebuild() {
    let port = TableStatePort::in_memory();
    {
        let mut table = build(&port);
        table.dispatch(Intent::ToggleSort {
            column: "status".into(),
            multi: false,
        });
        table.dispatch(Intent::SetPageSize(20));
        table.dispatch(Intent::NextPage);
        table.dispatch(Intent::ToggleRowSelected("4".into()));
        table.dispatch(Intent::SetColumnVisibility {
            column: "id".into(),
            visible: false,
        });
        assert!(table.persistence_warnings().is_empty());
    }

    let table = build(&port);
    assert!(table.restore_issues().is_empty());
    let state = table.state();
    assert_eq!(state.sorting, vec![SortEntry::asc("status")]);
    assert_eq!(state.pagination.page_size, 20);
    assert_eq!(state.pagination.page_index, 1);
    assert!(state.row_selection.contains("4"));
    assert!(!state.is_visible("id"));
    assert_eq!(table.model().page_len(), 15);
}

#[test]
fn corrupt_fields_fall_back_and_are_reported() {
    let mut entries = HashMap::new();
    entries.insert(
        "data-table-state".to_string(),
        StoredEntry {
            key: "data-table-state".into(),
            version: tabula_runtime::STATE_VERSION,
            data: br#"{"sorting": 42, "grouping": ["status"], "pagination": {"pageIndex": 99, "pageSize": 10}, "columnFilters": [{"id": "ghost", "value": "x"}]}"#.to_vec(),
        },
    );
    let port = TableStatePort::new(Arc::new(MemoryStorage::with_entries(entries)));
    let table = build(&port);

    assert!(table.state().sorting.is_empty());
    assert_eq!(table.state().grouping, vec!["status"]);
    assert!(table.state().column_filters.is_empty());
    // Three status groups fit on one page.
    assert_eq!(table.state().pagination.page_index, 0);
    assert!(matches!(
        table.restore_issues(),
        [StateRestoreError::FieldMismatch { field, .. }] if field == "sorting"
    ));
}

#[test]
fn unparseable_blob_yields_defaults() {
    let mut entries = HashMap::new();
    entries.insert(
        "data-table-state".to_string(),
        StoredEntry {
            key: "data-table-state".into(),
            version: tabula_runtime::STATE_VERSION,
            data: b"{{{".to_vec(),
        },
    );
    let port = TableStatePort::new(Arc::new(MemoryStorage::with_entries(entries)));
    let table = build(&port);
    assert_eq!(table.state(), table.initial_state());
    assert!(matches!(table.restore_issues(), [StateRestoreError::Malformed(_)]));
}

#[test]
fn overrides_beat_persisted_fields() {
    let port = TableStatePort::in_memory();
    {
        let mut table = build(&port);
        table.dispatch(Intent::SetColumnFilter {
            column: "title".into(),
            value: Some(FilterValue::from("1")),
        });
        table.dispatch(Intent::SetGrouping(vec!["status".into()]));
    }

    let table = Table::builder(registry())
        .records(records())
        .persistence(port.clone())
        .initial_state(json!({"grouping": []}))
        .build();
    assert!(table.state().grouping.is_empty());
    assert_eq!(table.state().column_filters.len(), 1);
}

#[test]
fn reset_clears_storage() {
    let port = TableStatePort::in_memory();
    let mut table = build(&port);
    table.dispatch(Intent::SetGlobalFilter("item".into()));
    assert!(port.load_entry("data-table-state").is_some());

    table.reset();
    assert!(port.load_entry("data-table-state").is_none());
    assert_eq!(table.state(), table.initial_state());
}

#[test]
fn persistence_can_be_turned_off() {
    let port = TableStatePort::in_memory();
    let mut table = Table::builder(registry())
        .records(records())
        .config(TableConfig::default().persist(false))
        .persistence(port.clone())
        .build();
    table.dispatch(Intent::NextPage);
    assert!(port.load_entry("data-table-state").is_none());
}

#[test]
fn custom_storage_key_is_used() {
    let port = TableStatePort::in_memory();
    let mut table = Table::builder(registry())
        .records(records())
        .config(TableConfig::default().storage_key("tasks"))
        .persistence(port.clone())
        .build();
    table.dispatch(Intent::NextPage);
    assert!(port.load_entry("tasks").is_some());
    assert!(port.load_entry("data-table-state").is_none());
}

#[test]
fn background_writes_land_after_flush() {
    let port = TableStatePort::in_memory();
    {
        let mut table = Table::builder(registry())
            .records(records())
            .options(TableOptions::default().persistence(PersistenceMode::Background))
            .persistence(port.clone())
            .build();
        for _ in 0..3 {
            table.dispatch(Intent::NextPage);
        }
        table.dispatch(Intent::SelectAll {
            scope: SelectAllScope::Filtered,
            selected: true,
        });
        table.flush_persistence();
        assert!(table.persistence_warnings().is_empty());
    }

    let table = build(&port);
    assert_eq!(table.state().pagination.page_index, 3);
    assert_eq!(table.state().row_selection.len(), 35);
}

struct ReadOnly;

impl StorageBackend for ReadOnly {
    fn name(&self) -> &str {
        "ReadOnly"
    }

    fn load_all(&self) -> StorageResult<HashMap<String, StoredEntry>> {
        Ok(HashMap::new())
    }

    fn save_all(&self, _entries: &HashMap<String, StoredEntry>) -> StorageResult<()> {
        Err(StorageError::Unavailable("read-only volume".into()))
    }
}

#[test]
fn write_failures_are_warnings_not_errors() {
    let port = TableStatePort::new(Arc::new(ReadOnly));
    let mut table = build(&port);
    assert!(table.dispatch(Intent::NextPage));
    assert_eq!(table.state().pagination.page_index, 1);

    let warnings = table.persistence_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].key, "data-table-state");
    assert!(table.persistence_warnings().is_empty());
}
