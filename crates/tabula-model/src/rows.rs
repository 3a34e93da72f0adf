#![forbid(unsafe_code)]

//! Row arena shared by the pipeline stages.
//!
//! Rows are nodes in a flat `Vec`; group rows list their children as arena
//! indices. There are no parent pointers. The arena is rebuilt by the group
//! stage and only its child lists are reordered by the sort stage.

use tabula_core::{CellValue, RowId};

/// Accessor output for every record, evaluated once per data generation.
#[derive(Debug, Clone, Default)]
pub struct CoreRows {
    /// Resolved ids in source order.
    pub ids: Vec<RowId>,
    /// `cells[source_index][column_index]`.
    pub cells: Vec<Vec<CellValue>>,
}

impl CoreRows {
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A group node.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    /// Column this level groups by.
    pub column_id: String,
    /// Shared value of the grouping column.
    pub value: CellValue,
    /// Number of leaf rows beneath this group.
    pub leaf_count: usize,
    /// One aggregated cell per registry column. The grouping column's own
    /// cell is the group value.
    pub aggregates: Vec<CellValue>,
    /// Child rows as arena indices.
    pub children: Vec<usize>,
}

/// What a row is.
#[derive(Debug, Clone, PartialEq)]
pub enum RowKind {
    /// A raw record.
    Leaf { source_index: usize },
    /// A group of rows sharing a value.
    Group(GroupRow),
}

/// One node of the derived row tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: RowId,
    pub depth: usize,
    pub kind: RowKind,
}

impl Row {
    #[must_use]
    pub fn is_group(&self) -> bool {
        matches!(self.kind, RowKind::Group(_))
    }

    /// Source index for leaf rows.
    #[must_use]
    pub fn source_index(&self) -> Option<usize> {
        match self.kind {
            RowKind::Leaf { source_index } => Some(source_index),
            RowKind::Group(_) => None,
        }
    }

    #[must_use]
    pub fn group(&self) -> Option<&GroupRow> {
        match &self.kind {
            RowKind::Group(group) => Some(group),
            RowKind::Leaf { .. } => None,
        }
    }
}

/// Arena plus top-level order.
#[derive(Debug, Clone, Default)]
pub struct RowTree {
    pub arena: Vec<Row>,
    pub roots: Vec<usize>,
}

impl RowTree {
    /// Cell of a row: the record's cell for leaves, the aggregate for groups.
    #[must_use]
    pub fn cell<'a>(&'a self, core: &'a CoreRows, row: usize, column: usize) -> &'a CellValue {
        static NULL: CellValue = CellValue::Null;
        match &self.arena[row].kind {
            RowKind::Leaf { source_index } => core
                .cells
                .get(*source_index)
                .and_then(|cells| cells.get(column))
                .unwrap_or(&NULL),
            RowKind::Group(group) => group.aggregates.get(column).unwrap_or(&NULL),
        }
    }

    /// Children of a row, or the roots for `None`.
    #[must_use]
    pub fn children(&self, parent: Option<usize>) -> &[usize] {
        match parent {
            None => &self.roots,
            Some(idx) => match &self.arena[idx].kind {
                RowKind::Group(group) => &group.children,
                RowKind::Leaf { .. } => &[],
            },
        }
    }

    /// Leaf source indices in depth-first order.
    #[must_use]
    pub fn leaves_in_order(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(idx) = stack.pop() {
            match &self.arena[idx].kind {
                RowKind::Leaf { source_index } => out.push(*source_index),
                RowKind::Group(group) => stack.extend(group.children.iter().rev().copied()),
            }
        }
        out
    }

    /// Ids of every group row, in arena order.
    #[must_use]
    pub fn group_ids(&self) -> Vec<&str> {
        self.arena
            .iter()
            .filter(|row| row.is_group())
            .map(|row| row.id.as_str())
            .collect()
    }
}
