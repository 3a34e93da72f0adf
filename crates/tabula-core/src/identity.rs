#![forbid(unsafe_code)]

//! Row identity resolution.
//!
//! Selection and expansion are keyed by [`RowId`], so ids must survive
//! re-derivation. Positional ids only survive as long as the source order
//! does; callers with a natural key should use [`RowIdResolver::custom`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Stable row identifier.
pub type RowId = String;

/// Caller-supplied id function.
pub type IdFn<R> = Arc<dyn Fn(&R, usize) -> RowId + Send + Sync>;

/// Maps each raw record to a stable id.
pub enum RowIdResolver<R> {
    /// The record's source index, stringified.
    Positional,
    /// Caller-supplied key extraction.
    Custom(IdFn<R>),
}

impl<R> RowIdResolver<R> {
    /// Resolver backed by a caller function of `(record, source_index)`.
    #[must_use]
    pub fn custom(f: impl Fn(&R, usize) -> RowId + Send + Sync + 'static) -> Self {
        RowIdResolver::Custom(Arc::new(f))
    }

    /// Resolve one record.
    pub fn resolve(&self, record: &R, index: usize) -> RowId {
        match self {
            RowIdResolver::Positional => index.to_string(),
            RowIdResolver::Custom(f) => f(record, index),
        }
    }

    /// Resolve every record in source order.
    ///
    /// Duplicate ids are kept as-is and logged; selection state for a
    /// duplicated id applies to every row carrying it.
    pub fn resolve_all(&self, records: &[R]) -> Vec<RowId> {
        let ids: Vec<RowId> = records
            .iter()
            .enumerate()
            .map(|(i, r)| self.resolve(r, i))
            .collect();

        if matches!(self, RowIdResolver::Custom(_)) {
            let mut seen = HashSet::with_capacity(ids.len());
            let mut duplicates = 0usize;
            for id in &ids {
                if !seen.insert(id.as_str()) {
                    duplicates += 1;
                    if duplicates == 1 {
                        tracing::warn!(row_id = %id, "duplicate row id from resolver");
                    }
                }
            }
            if duplicates > 1 {
                tracing::warn!(duplicates, "resolver produced duplicate row ids");
            }
        }
        ids
    }
}

impl<R> Default for RowIdResolver<R> {
    fn default() -> Self {
        RowIdResolver::Positional
    }
}

impl<R> Clone for RowIdResolver<R> {
    fn clone(&self) -> Self {
        match self {
            RowIdResolver::Positional => RowIdResolver::Positional,
            RowIdResolver::Custom(f) => RowIdResolver::Custom(Arc::clone(f)),
        }
    }
}

impl<R> fmt::Debug for RowIdResolver<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowIdResolver::Positional => f.write_str("Positional"),
            RowIdResolver::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
