#![forbid(unsafe_code)]

//! Sort stage.
//!
//! Sort keys apply in order; later keys only break ties of earlier ones.
//! Nulls sort last in both directions. Rows that tie on every key keep their
//! input order.
//!
//! Ordering goes through [`stable_sort_by`], which stays stable and
//! terminates for any comparator, including inconsistent caller ones.

use std::cmp::Ordering;

use tabula_core::{CellValue, ColumnRegistry, PredicateError, SortEntry, SortKind};

use crate::rows::{CoreRows, RowKind, RowTree};

/// Stable bottom-up merge sort.
///
/// Takes from the right run only when it is strictly `Less` than the left
/// head, so equal elements keep their relative order.
pub fn stable_sort_by<T: Clone>(items: &mut Vec<T>, mut compare: impl FnMut(&T, &T) -> Ordering) {
    let len = items.len();
    if len < 2 {
        return;
    }
    let mut src = items.clone();
    let mut dst = Vec::with_capacity(len);
    let mut width = 1;
    while width < len {
        dst.clear();
        let mut start = 0;
        while start < len {
            let mid = (start + width).min(len);
            let end = (start + 2 * width).min(len);
            let (mut i, mut j) = (start, mid);
            while i < mid && j < end {
                if compare(&src[j], &src[i]) == Ordering::Less {
                    dst.push(src[j].clone());
                    j += 1;
                } else {
                    dst.push(src[i].clone());
                    i += 1;
                }
            }
            dst.extend_from_slice(&src[i..mid]);
            dst.extend_from_slice(&src[j..end]);
            start = end;
        }
        std::mem::swap(&mut src, &mut dst);
        width *= 2;
    }
    *items = src;
}

/// Compare two non-null cells with a column's comparator.
pub fn compare_values(
    kind: &SortKind,
    column: &str,
    a: &CellValue,
    b: &CellValue,
) -> Result<Ordering, PredicateError> {
    match kind {
        SortKind::Custom(compare) => compare(a, b),
        SortKind::Text => Ok(a.to_string().cmp(&b.to_string())),
        SortKind::Numeric => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(x.total_cmp(&y)),
            _ => Err(PredicateError::new(column, "numeric sort on a non-numeric value")),
        },
        SortKind::Auto => match (a, b) {
            (CellValue::Text(x), CellValue::Text(y)) => Ok(x.cmp(y)),
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(x.total_cmp(&y)),
                _ => Err(PredicateError::new(column, "cannot order text against a number")),
            },
        },
    }
}

/// Null-aware, direction-aware comparison. Errors are logged and tie.
pub fn compare_cells(kind: &SortKind, column: &str, desc: bool, a: &CellValue, b: &CellValue) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => match compare_values(kind, column, a, b) {
            Ok(ordering) if desc => ordering.reverse(),
            Ok(ordering) => ordering,
            Err(err) => {
                tracing::debug!(column, error = %err, "comparator failed; treating pair as equal");
                Ordering::Equal
            }
        },
    }
}

struct ActiveSort<'a> {
    column: usize,
    id: &'a str,
    kind: &'a SortKind,
    desc: bool,
}

/// Run the sort stage over a grouped tree, returning a reordered copy.
pub fn sort_tree<R>(
    core: &CoreRows,
    registry: &ColumnRegistry<R>,
    tree: &RowTree,
    sorting: &[SortEntry],
) -> RowTree {
    let keys: Vec<ActiveSort<'_>> = sorting
        .iter()
        .filter_map(|entry| {
            let column = registry.index_of(&entry.id)?;
            let descriptor = &registry.columns()[column];
            Some(ActiveSort {
                column,
                id: descriptor.id(),
                kind: descriptor.sort_kind(),
                desc: entry.desc,
            })
        })
        .collect();

    let mut sorted = tree.clone();
    if keys.is_empty() {
        return sorted;
    }

    let compare = |a: &usize, b: &usize| {
        for key in &keys {
            let ordering = compare_cells(
                key.kind,
                key.id,
                key.desc,
                tree.cell(core, *a, key.column),
                tree.cell(core, *b, key.column),
            );
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    };

    stable_sort_by(&mut sorted.roots, compare);
    for idx in 0..sorted.arena.len() {
        if let RowKind::Group(group) = &mut sorted.arena[idx].kind {
            stable_sort_by(&mut group.children, compare);
        }
    }
    sorted
}
