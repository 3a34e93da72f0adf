#![forbid(unsafe_code)]

//! Tracing integration tests for the runtime.
//!
//! Restore issues, persistence write failures, and failed fetches are
//! reported as `WARN` events; applying an intent is a `DEBUG` event.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tabula_core::{ColumnDescriptor, ColumnRegistry};
use tabula_model::Intent;
use tabula_runtime::{
    FetchRequest, FetchResponse, MemoryStorage, SourceFetchError, StoredEntry, Table,
    TableStatePort,
};

use tracing_subscriber::layer::SubscriberExt;

#[derive(Debug, Clone)]
struct CapturedEvent {
    level: tracing::Level,
    fields: HashMap<String, String>,
}

#[derive(Clone, Default)]
struct CaptureHandle {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CaptureHandle {
    fn messages_at(&self, level: tracing::Level) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.level == level)
            .filter_map(|e| e.fields.get("message").cloned())
            .collect()
    }
}

struct Capture(CaptureHandle);

struct FieldVisitor(Vec<(String, String)>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Capture {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = FieldVisitor(Vec::new());
        event.record(&mut visitor);
        self.0.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            fields: visitor.0.into_iter().collect(),
        });
    }
}

fn with_capture(f: impl FnOnce()) -> CaptureHandle {
    let handle = CaptureHandle::default();
    let subscriber = tracing_subscriber::registry().with(Capture(handle.clone()));
    tracing::subscriber::with_default(subscriber, f);
    handle
}

fn registry() -> ColumnRegistry<Value> {
    ColumnRegistry::new(vec![ColumnDescriptor::field("a")]).unwrap()
}

#[test]
fn restore_issues_are_warned() {
    let mut entries = HashMap::new();
    entries.insert(
        "data-table-state".to_string(),
        StoredEntry {
            key: "data-table-state".into(),
            version: tabula_runtime::STATE_VERSION,
            data: br#"{"theme": "dark"}"#.to_vec(),
        },
    );
    let port = TableStatePort::new(Arc::new(MemoryStorage::with_entries(entries)));

    let capture = with_capture(|| {
        let table = Table::builder(registry()).persistence(port).build();
        assert_eq!(table.restore_issues().len(), 1);
    });
    let warnings = capture.messages_at(tracing::Level::WARN);
    assert!(
        warnings.iter().any(|m| m == "persisted table state issue"),
        "{warnings:?}"
    );
}

#[test]
fn applied_intents_are_debug_events() {
    let capture = with_capture(|| {
        let mut table = Table::builder(registry())
            .records((0..30).map(|i| json!({"a": i})).collect())
            .build();
        table.dispatch(Intent::NextPage);
        table.dispatch(Intent::FirstPage);
        table.dispatch(Intent::FirstPage);
    });
    let applied = capture
        .messages_at(tracing::Level::DEBUG)
        .into_iter()
        .filter(|m| m == "intent applied")
        .count();
    assert_eq!(applied, 2);
}

#[test]
fn failed_fetch_is_warned() {
    let capture = with_capture(|| {
        let table = Table::builder(registry())
            .source(Arc::new(
                |_: &FetchRequest| -> Result<FetchResponse<Value>, SourceFetchError> {
                    Err(SourceFetchError::Failed("timeout".into()))
                },
            ))
            .build();
        assert!(table.fetch_status().and_then(|s| s.error()).is_some());
    });
    let warnings = capture.messages_at(tracing::Level::WARN);
    assert!(
        warnings.iter().any(|m| m == "fetch failed; keeping previous rows"),
        "{warnings:?}"
    );
}
