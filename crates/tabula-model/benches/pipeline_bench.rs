//! Benchmarks for row model derivation.
//!
//! Run with: cargo bench -p tabula-model

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::hint::black_box;
use tabula_core::{
    ColumnDescriptor, ColumnFilter, ColumnRegistry, FilterKind, RowIdResolver, SortEntry,
    TableState,
};
use tabula_model::{Pipeline, PipelineOptions};

fn registry() -> ColumnRegistry<Value> {
    ColumnRegistry::new(vec![
        ColumnDescriptor::field("id"),
        ColumnDescriptor::field("title").filter(FilterKind::Text),
        ColumnDescriptor::field("status"),
        ColumnDescriptor::field("score"),
    ])
    .unwrap()
}

fn records(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            json!({
                "id": i,
                "title": format!("item {}", i * 7919 % 10_007),
                "status": ["todo", "doing", "done"][i % 3],
                "score": (i * 31) % 997,
            })
        })
        .collect()
}

// ============================================================================
// Full derivation
// ============================================================================

fn bench_cold_derive(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline/cold");
    let reg = registry();
    let state = TableState {
        sorting: vec![SortEntry::desc("score"), SortEntry::asc("title")],
        column_filters: vec![ColumnFilter::new("title", "1")],
        ..TableState::default()
    };

    for n in [1_000, 10_000, 50_000] {
        let rows = records(n);
        group.bench_with_input(BenchmarkId::new("filter_sort", n), &rows, |b, rows| {
            b.iter(|| {
                let mut pipeline = Pipeline::new();
                let model = pipeline.derive(
                    rows,
                    1,
                    &reg,
                    &RowIdResolver::Positional,
                    &state,
                    &PipelineOptions::default(),
                );
                black_box(model.row_count());
            })
        });
    }
    group.finish();
}

// ============================================================================
// Page change on a warm pipeline
// ============================================================================

fn bench_page_change(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline/warm");
    let reg = registry();
    let rows = records(50_000);
    let mut state = TableState {
        sorting: vec![SortEntry::asc("status")],
        ..TableState::default()
    };
    let mut pipeline = Pipeline::new();
    let opts = PipelineOptions::default();
    pipeline.derive(&rows, 1, &reg, &RowIdResolver::Positional, &state, &opts);

    group.bench_function("page_change", |b| {
        b.iter(|| {
            state.pagination.page_index = (state.pagination.page_index + 1) % 100;
            let model = pipeline.derive(&rows, 1, &reg, &RowIdResolver::Positional, &state, &opts);
            black_box(model.page_len());
        })
    });
    group.finish();
}

criterion_group!(benches, bench_cold_derive, bench_page_change);
criterion_main!(benches);
