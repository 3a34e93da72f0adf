#![forbid(unsafe_code)]

//! Lenient restore of a persisted [`TableState`].
//!
//! A persisted blob is merged over a base state one top-level field at a
//! time. A field that fails to decode keeps the base value and is reported
//! as a [`StateRestoreError`]; unknown fields are reported and ignored. The
//! merged result is always normalized against the registry, so restore can
//! never produce a state that violates its invariants.
//!
//! The same merge is used for explicit overrides supplied at construction,
//! giving the layering `defaults <- persisted <- overrides`.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::column::ColumnRegistry;
use crate::error::StateRestoreError;
use crate::state::TableState;

/// Result of a lenient restore.
#[derive(Debug, Clone, PartialEq)]
pub struct Restored {
    /// The merged, normalized state.
    pub state: TableState,
    /// Every problem encountered. Empty on a clean restore.
    pub issues: Vec<StateRestoreError>,
}

impl Restored {
    /// Whether the blob restored without any issue.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

fn decode<T: DeserializeOwned>(
    field: &str,
    value: &Value,
    slot: &mut T,
    issues: &mut Vec<StateRestoreError>,
) {
    match T::deserialize(value) {
        Ok(decoded) => *slot = decoded,
        Err(err) => issues.push(StateRestoreError::FieldMismatch {
            field: field.to_owned(),
            message: err.to_string(),
        }),
    }
}

/// Merge the fields of a JSON object over `state`, returning the issues.
///
/// Does not normalize; callers normalize once after all layers are merged.
pub fn merge_fields(state: &mut TableState, value: &Value) -> Vec<StateRestoreError> {
    let mut issues = Vec::new();
    let Some(object) = value.as_object() else {
        issues.push(StateRestoreError::NotAnObject);
        return issues;
    };

    for (key, field) in object {
        match key.as_str() {
            "sorting" => decode(key, field, &mut state.sorting, &mut issues),
            "columnFilters" => decode(key, field, &mut state.column_filters, &mut issues),
            "globalFilter" => decode(key, field, &mut state.global_filter, &mut issues),
            "columnVisibility" => decode(key, field, &mut state.column_visibility, &mut issues),
            "columnOrder" => decode(key, field, &mut state.column_order, &mut issues),
            "columnPinning" => decode(key, field, &mut state.column_pinning, &mut issues),
            "columnSizing" => decode(key, field, &mut state.column_sizing, &mut issues),
            "pagination" => decode(key, field, &mut state.pagination, &mut issues),
            "rowSelection" => decode(key, field, &mut state.row_selection, &mut issues),
            "grouping" => decode(key, field, &mut state.grouping, &mut issues),
            "expanded" => decode(key, field, &mut state.expanded, &mut issues),
            _ => issues.push(StateRestoreError::UnknownField(key.clone())),
        }
    }
    issues
}

/// Parse a persisted blob and merge it over `base`, then normalize.
///
/// Never fails: malformed input yields `base` normalized plus an issue.
pub fn restore_state<R>(base: TableState, blob: &str, registry: &ColumnRegistry<R>) -> Restored {
    let mut state = base;
    let issues = match serde_json::from_str::<Value>(blob) {
        Ok(value) => merge_fields(&mut state, &value),
        Err(err) => vec![StateRestoreError::Malformed(err.to_string())],
    };

    for issue in &issues {
        tracing::warn!(%issue, "persisted table state issue");
    }

    state.normalize(registry);
    Restored { state, issues }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnDescriptor;
    use crate::state::{ColumnFilter, SortEntry};
    use serde_json::json;

    fn registry() -> ColumnRegistry<Value> {
        ColumnRegistry::new(vec![
            ColumnDescriptor::field("title"),
            ColumnDescriptor::field("status"),
        ])
        .unwrap()
    }

    #[test]
    fn clean_blob_restores_every_field() {
        let blob = json!({
            "sorting": [{"id": "status", "desc": true}],
            "columnFilters": [{"id": "title", "value": "a"}],
            "globalFilter": "x",
            "pagination": {"pageIndex": 2, "pageSize": 20},
            "rowSelection": {"3": true},
            "grouping": ["status"],
            "expanded": {"status:todo": true}
        })
        .to_string();
        let restored = restore_state(TableState::default(), &blob, &registry());
        assert!(restored.is_clean(), "{:?}", restored.issues);
        let s = restored.state;
        assert_eq!(s.sorting, vec![SortEntry::desc("status")]);
        assert_eq!(s.column_filters, vec![ColumnFilter::new("title", "a")]);
        assert_eq!(s.global_filter.as_deref(), Some("x"));
        assert_eq!(s.pagination.page_size, 20);
        assert!(s.row_selection.contains("3"));
        assert!(s.expanded.contains("status:todo"));
        assert_eq!(s.column_order, vec!["title", "status"]);
    }

    #[test]
    fn mismatched_field_falls_back_to_base() {
        let mut base = TableState::default();
        base.pagination.page_size = 25;
        let blob = r#"{"pagination": "oops", "sorting": [{"id": "title", "desc": false}]}"#;
        let restored = restore_state(base, blob, &registry());

        assert_eq!(restored.state.pagination.page_size, 25);
        assert_eq!(restored.state.sorting, vec![SortEntry::asc("title")]);
        assert_eq!(restored.issues.len(), 1);
        assert!(matches!(
            &restored.issues[0],
            StateRestoreError::FieldMismatch { field, .. } if field == "pagination"
        ));
    }

    #[test]
    fn unknown_fields_and_malformed_blobs_are_reported() {
        let restored = restore_state(TableState::default(), r#"{"theme": "dark"}"#, &registry());
        assert_eq!(restored.issues, vec![StateRestoreError::UnknownField("theme".into())]);

        let restored = restore_state(TableState::default(), "{not json", &registry());
        assert!(matches!(restored.issues[0], StateRestoreError::Malformed(_)));
        assert_eq!(restored.state.column_order, vec!["title", "status"]);

        let restored = restore_state(TableState::default(), "[1, 2]", &registry());
        assert_eq!(restored.issues, vec![StateRestoreError::NotAnObject]);
    }

    #[test]
    fn restored_state_is_normalized() {
        let blob = r#"{"sorting": [{"id": "ghost", "desc": false}], "pagination": {"pageIndex": 0, "pageSize": 0}}"#;
        let restored = restore_state(TableState::default(), blob, &registry());
        assert!(restored.state.sorting.is_empty());
        assert_eq!(restored.state.pagination.page_size, 10);
    }

    #[test]
    fn overrides_layer_after_persisted_fields() {
        let mut state = TableState::default();
        let persisted = json!({"pagination": {"pageIndex": 1, "pageSize": 30}, "grouping": ["status"]});
        let overrides = json!({"grouping": []});
        assert!(merge_fields(&mut state, &persisted).is_empty());
        assert!(merge_fields(&mut state, &overrides).is_empty());
        assert_eq!(state.pagination.page_size, 30);
        assert!(state.grouping.is_empty());
    }
}
