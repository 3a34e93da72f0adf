#![forbid(unsafe_code)]

//! Filter stage.
//!
//! A row passes when it matches the global filter (if any) AND every active
//! column filter. The stage never removes rows from the source; it returns the
//! passing source indices in source order.
//!
//! | Filter kind | `Text(q)` value | `Set(vs)` value |
//! |-------------|-----------------|-----------------|
//! | `None` | substring | membership |
//! | `Text` | substring | any element as substring |
//! | `Select` | membership of `{q}` | membership |
//! | `Custom` | caller predicate | caller predicate |
//!
//! Substring matching is case-insensitive; membership compares the cell's
//! stringified value exactly. Empty values impose no constraint.

use tabula_core::{
    Capabilities, CellValue, ColumnFilter, ColumnRegistry, FilterKind, FilterValue,
    PredicateError,
};

use crate::rows::CoreRows;

static NULL: CellValue = CellValue::Null;

struct ActiveFilter<'a> {
    column: usize,
    id: &'a str,
    kind: &'a FilterKind,
    value: &'a FilterValue,
    needle: Option<String>,
}

fn contains_ci(cell: &CellValue, lowered_needle: &str) -> bool {
    cell.to_string().to_lowercase().contains(lowered_needle)
}

fn member_of(cell: &CellValue, values: &[String]) -> bool {
    let text = cell.to_string();
    values.iter().any(|v| *v == text)
}

impl ActiveFilter<'_> {
    fn evaluate(&self, cell: &CellValue) -> Result<bool, PredicateError> {
        match (self.kind, self.value) {
            (FilterKind::Custom(predicate), value) => predicate(cell, value),
            (FilterKind::None | FilterKind::Text, FilterValue::Text(_)) => Ok(self
                .needle
                .as_deref()
                .is_none_or(|needle| contains_ci(cell, needle))),
            (FilterKind::Text, FilterValue::Set(values)) => Ok(values
                .iter()
                .any(|v| contains_ci(cell, &v.to_lowercase()))),
            (FilterKind::None | FilterKind::Select { .. }, FilterValue::Set(values)) => {
                Ok(member_of(cell, values))
            }
            (FilterKind::Select { .. }, FilterValue::Text(v)) => Ok(cell.to_string() == *v),
        }
    }
}

/// Run the filter stage over every record.
pub fn filter_rows<R>(
    core: &CoreRows,
    registry: &ColumnRegistry<R>,
    filters: &[ColumnFilter],
    global: Option<&str>,
) -> Vec<usize> {
    let active: Vec<ActiveFilter<'_>> = filters
        .iter()
        .filter(|f| !f.value.is_empty())
        .filter_map(|f| {
            let column = registry.index_of(&f.id)?;
            let descriptor = &registry.columns()[column];
            if !descriptor.caps().contains(Capabilities::FILTERABLE) {
                return None;
            }
            let needle = match &f.value {
                FilterValue::Text(q) => Some(q.to_lowercase()),
                FilterValue::Set(_) => None,
            };
            Some(ActiveFilter {
                column,
                id: descriptor.id(),
                kind: descriptor.filter_kind(),
                value: &f.value,
                needle,
            })
        })
        .collect();

    let global_needle = global.filter(|g| !g.is_empty()).map(str::to_lowercase);
    let global_columns: Vec<usize> = registry
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| c.caps().contains(Capabilities::FILTERABLE))
        .map(|(i, _)| i)
        .collect();

    if active.is_empty() && global_needle.is_none() {
        return (0..core.len()).collect();
    }

    let mut failures = 0usize;
    let passing: Vec<usize> = core
        .cells
        .iter()
        .enumerate()
        .filter(|(_, cells)| {
            if let Some(needle) = &global_needle {
                let hit = global_columns
                    .iter()
                    .any(|&c| cells.get(c).is_some_and(|cell| contains_ci(cell, needle)));
                if !hit {
                    return false;
                }
            }
            active.iter().all(|f| {
                let cell = cells.get(f.column).unwrap_or(&NULL);
                match f.evaluate(cell) {
                    Ok(pass) => pass,
                    Err(err) => {
                        failures += 1;
                        tracing::debug!(column = f.id, error = %err, "filter predicate failed; row excluded");
                        false
                    }
                }
            })
        })
        .map(|(i, _)| i)
        .collect();

    if failures > 0 {
        tracing::debug!(failures, "filter stage predicate failures");
    }
    passing
}
