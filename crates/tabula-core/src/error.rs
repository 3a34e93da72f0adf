#![forbid(unsafe_code)]

//! Error taxonomy shared across the Tabula crates.
//!
//! # Failure Modes
//!
//! | Error | Cause | Recovery |
//! |-------|-------|----------|
//! | [`ColumnError`] | Invalid column descriptor | Registry construction fails |
//! | [`StateRestoreError`] | Malformed persisted blob | Field falls back to its default |
//! | [`PredicateError`] | Filter/comparator rejected a value | Row fails / pair ties |
//!
//! Fetch and persistence errors live in `tabula-runtime`, next to the ports
//! that produce them.

use std::fmt;

/// Invalid column descriptor passed to a
/// [`ColumnRegistry`](crate::column::ColumnRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnError {
    /// A column id was empty.
    EmptyId { position: usize },
    /// Two descriptors share an id.
    DuplicateId(String),
    /// `min` exceeds `max` in a column's size bounds.
    InvalidSizeBounds { id: String, min: u32, max: u32 },
}

impl fmt::Display for ColumnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyId { position } => write!(f, "column at position {position} has an empty id"),
            Self::DuplicateId(id) => write!(f, "duplicate column id '{id}'"),
            Self::InvalidSizeBounds { id, min, max } => {
                write!(f, "column '{id}' has min size {min} greater than max size {max}")
            }
        }
    }
}

impl std::error::Error for ColumnError {}

/// One problem found while restoring a persisted table state.
///
/// Restore never fails as a whole: each issue names the field that was
/// discarded and replaced by its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateRestoreError {
    /// The blob was not valid JSON.
    Malformed(String),
    /// The blob parsed but was not a JSON object.
    NotAnObject,
    /// A recognized field had the wrong shape.
    FieldMismatch { field: String, message: String },
    /// A field the state does not know about.
    UnknownField(String),
    /// The stored envelope was written by a different schema version.
    VersionMismatch { stored: u32, expected: u32 },
}

impl fmt::Display for StateRestoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "persisted state is not valid JSON: {msg}"),
            Self::NotAnObject => f.write_str("persisted state is not a JSON object"),
            Self::FieldMismatch { field, message } => {
                write!(f, "persisted field '{field}' discarded: {message}")
            }
            Self::UnknownField(field) => write!(f, "unknown persisted field '{field}' ignored"),
            Self::VersionMismatch { stored, expected } => {
                write!(f, "persisted state version {stored} differs from {expected}; merged leniently")
            }
        }
    }
}

impl std::error::Error for StateRestoreError {}

/// A filter predicate or comparator could not evaluate a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateError {
    /// Column whose predicate failed.
    pub column: String,
    /// Human-readable reason.
    pub message: String,
}

impl PredicateError {
    /// Create a predicate error for a column.
    #[must_use]
    pub fn new(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for PredicateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "predicate on column '{}' failed: {}", self.column, self.message)
    }
}

impl std::error::Error for PredicateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_name_the_subject() {
        let dup = ColumnError::DuplicateId("title".into());
        assert!(dup.to_string().contains("title"));

        let bounds = ColumnError::InvalidSizeBounds {
            id: "w".into(),
            min: 10,
            max: 5,
        };
        assert!(bounds.to_string().contains("min size 10"));

        let field = StateRestoreError::FieldMismatch {
            field: "sorting".into(),
            message: "expected array".into(),
        };
        assert!(field.to_string().contains("sorting"));

        let pred = PredicateError::new("price", "not a number");
        assert_eq!(
            pred.to_string(),
            "predicate on column 'price' failed: not a number"
        );
    }
}
