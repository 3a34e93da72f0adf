#![forbid(unsafe_code)]

//! Group stage.
//!
//! Partitions the filtered leaves by each grouping column in turn. Groups
//! appear in order of first appearance among their parent's leaves. A group
//! id is `column:value`; nested ids are prefixed by the parent id and `>`.
//! With no grouping the tree is a flat list of leaves.

use std::collections::{HashMap, HashSet};

use tabula_core::{Aggregation, CellValue, ColumnRegistry};

use crate::rows::{CoreRows, GroupRow, Row, RowKind, RowTree};

/// Run the group stage over the filtered source indices.
pub fn group_rows<R>(
    core: &CoreRows,
    registry: &ColumnRegistry<R>,
    filtered: &[usize],
    grouping: &[String],
) -> RowTree {
    let levels: Vec<usize> = grouping
        .iter()
        .filter_map(|id| registry.index_of(id))
        .collect();

    let mut tree = RowTree::default();
    let roots = build_level(&mut tree, core, registry, filtered, &levels, 0, None);
    tree.roots = roots;
    tree
}

fn build_level<R>(
    tree: &mut RowTree,
    core: &CoreRows,
    registry: &ColumnRegistry<R>,
    leaves: &[usize],
    levels: &[usize],
    depth: usize,
    parent_id: Option<&str>,
) -> Vec<usize> {
    let Some((&column, rest)) = levels.split_first() else {
        return leaves
            .iter()
            .map(|&source_index| {
                tree.arena.push(Row {
                    id: core.ids[source_index].clone(),
                    depth,
                    kind: RowKind::Leaf { source_index },
                });
                tree.arena.len() - 1
            })
            .collect();
    };

    // Partition by stringified value, keeping first-appearance order.
    let mut order: Vec<(String, CellValue)> = Vec::new();
    let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
    for &source_index in leaves {
        let value = core.cells[source_index]
            .get(column)
            .cloned()
            .unwrap_or_default();
        let key = value.to_string();
        buckets
            .entry(key.clone())
            .or_insert_with(|| {
                order.push((key, value));
                Vec::new()
            })
            .push(source_index);
    }

    let column_id = registry.columns()[column].id();
    let mut nodes = Vec::with_capacity(order.len());
    for (key, value) in order {
        let members = buckets.remove(&key).unwrap_or_default();
        let id = match parent_id {
            Some(parent) => format!("{parent}>{column_id}:{key}"),
            None => format!("{column_id}:{key}"),
        };

        let aggregates = registry
            .columns()
            .iter()
            .enumerate()
            .map(|(c, descriptor)| {
                if c == column {
                    value.clone()
                } else {
                    aggregate(descriptor.aggregation_kind(), core, c, &members)
                }
            })
            .collect();

        let slot = tree.arena.len();
        tree.arena.push(Row {
            id: id.clone(),
            depth,
            kind: RowKind::Group(GroupRow {
                column_id: column_id.to_owned(),
                value,
                leaf_count: members.len(),
                aggregates,
                children: Vec::new(),
            }),
        });
        let children = build_level(tree, core, registry, &members, rest, depth + 1, Some(&id));
        if let RowKind::Group(group) = &mut tree.arena[slot].kind {
            group.children = children;
        }
        nodes.push(slot);
    }
    nodes
}

/// Aggregate one column over a set of leaves.
#[must_use]
pub fn aggregate(kind: Aggregation, core: &CoreRows, column: usize, leaves: &[usize]) -> CellValue {
    let cells = leaves.iter().filter_map(|&i| core.cells[i].get(column));
    match kind {
        Aggregation::None => CellValue::Null,
        Aggregation::Count => CellValue::Int(leaves.len() as i64),
        Aggregation::UniqueCount => {
            let distinct: HashSet<String> = cells.map(ToString::to_string).collect();
            CellValue::Int(distinct.len() as i64)
        }
        Aggregation::Sum => {
            let mut int_sum: i64 = 0;
            let mut float_sum = 0.0;
            let mut all_int = true;
            for cell in cells {
                match cell {
                    CellValue::Int(i) => {
                        int_sum = int_sum.saturating_add(*i);
                        float_sum += *i as f64;
                    }
                    other => {
                        if let Some(v) = other.as_f64() {
                            all_int = false;
                            float_sum += v;
                        }
                    }
                }
            }
            if all_int {
                CellValue::Int(int_sum)
            } else {
                CellValue::Float(float_sum)
            }
        }
        Aggregation::Min | Aggregation::Max => {
            let mut best: Option<(&CellValue, f64)> = None;
            for cell in cells {
                let Some(v) = cell.as_f64() else { continue };
                let better = match best {
                    None => true,
                    Some((_, b)) if kind == Aggregation::Min => v < b,
                    Some((_, b)) => v > b,
                };
                if better {
                    best = Some((cell, v));
                }
            }
            best.map_or(CellValue::Null, |(cell, _)| cell.clone())
        }
        Aggregation::Mean => {
            let (sum, count) = cells
                .filter_map(CellValue::as_f64)
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if count == 0 {
                CellValue::Null
            } else {
                CellValue::Float(sum / count as f64)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tabula_core::ColumnDescriptor;

    fn fixture() -> (ColumnRegistry<Value>, CoreRows) {
        let registry = ColumnRegistry::new(vec![
            ColumnDescriptor::field("team"),
            ColumnDescriptor::field("status"),
            ColumnDescriptor::field("points").aggregation(Aggregation::Sum),
        ])
        .unwrap();
        let rows = [
            json!({"team": "red", "status": "open", "points": 3}),
            json!({"team": "blue", "status": "open", "points": 5}),
            json!({"team": "red", "status": "closed", "points": 1}),
            json!({"team": "red", "status": "open", "points": 2}),
        ];
        let core = CoreRows {
            ids: (0..rows.len()).map(|i| i.to_string()).collect(),
            cells: rows
                .iter()
                .map(|r| registry.columns().iter().map(|c| c.value(r)).collect())
                .collect(),
        };
        (registry, core)
    }

    #[test]
    fn no_grouping_yields_flat_leaves() {
        let (reg, core) = fixture();
        let tree = group_rows(&core, &reg, &[0, 2, 3], &[]);
        assert_eq!(tree.roots.len(), 3);
        assert_eq!(tree.leaves_in_order(), vec![0, 2, 3]);
        assert!(tree.arena.iter().all(|r| !r.is_group()));
    }

    #[test]
    fn groups_in_first_appearance_order_with_aggregates() {
        let (reg, core) = fixture();
        let tree = group_rows(&core, &reg, &[0, 1, 2, 3], &["team".to_string()]);
        let ids: Vec<&str> = tree.roots.iter().map(|&r| tree.arena[r].id.as_str()).collect();
        assert_eq!(ids, vec!["team:red", "team:blue"]);

        let red = tree.arena[tree.roots[0]].group().unwrap();
        assert_eq!(red.leaf_count, 3);
        assert_eq!(red.aggregates[0], CellValue::from("red"));
        assert_eq!(red.aggregates[1], CellValue::Int(3));
        assert_eq!(red.aggregates[2], CellValue::Int(6));
    }

    #[test]
    fn nested_groups_prefix_parent_ids() {
        let (reg, core) = fixture();
        let tree = group_rows(&core, &reg, &[0, 1, 2, 3], &["team".into(), "status".into()]);
        let red = tree.arena[tree.roots[0]].group().unwrap();
        let child_ids: Vec<&str> = red.children.iter().map(|&c| tree.arena[c].id.as_str()).collect();
        assert_eq!(child_ids, vec!["team:red>status:open", "team:red>status:closed"]);
        assert_eq!(tree.arena[red.children[0]].depth, 1);
        assert_eq!(tree.leaves_in_order(), vec![0, 3, 2, 1]);
        assert_eq!(tree.group_ids().len(), 5);
    }

    #[test]
    fn aggregations_cover_numeric_kinds() {
        let (_, core) = fixture();
        let all = [0, 1, 2, 3];
        assert_eq!(aggregate(Aggregation::Min, &core, 2, &all), CellValue::Int(1));
        assert_eq!(aggregate(Aggregation::Max, &core, 2, &all), CellValue::Int(5));
        assert_eq!(aggregate(Aggregation::Mean, &core, 2, &all), CellValue::Float(2.75));
        assert_eq!(aggregate(Aggregation::UniqueCount, &core, 1, &all), CellValue::Int(2));
        assert_eq!(aggregate(Aggregation::None, &core, 1, &all), CellValue::Null);
        assert_eq!(aggregate(Aggregation::Mean, &core, 1, &all), CellValue::Null);
    }
}
