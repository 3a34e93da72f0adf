#![forbid(unsafe_code)]

//! Column layout: order, visibility, pinning, and sizing.
//!
//! Visible leaf columns are laid out as left-pinned (in pin order), then the
//! unpinned columns in `column_order`, then right-pinned (in pin order).
//! Hidden columns are skipped in every region. This ordering is shared by
//! rendering and export headers.

use tabula_core::{ColumnRegistry, PinSide, TableState};

/// A column as laid out for display.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleColumn {
    pub id: String,
    /// Position in the registry.
    pub index: usize,
    pub pin: Option<PinSide>,
    /// Current width: the sized value, or the preferred width.
    pub width: f64,
    /// Offset from the start of the column's region.
    pub offset: f64,
}

/// Columns in display order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnLayout {
    pub columns: Vec<VisibleColumn>,
}

impl ColumnLayout {
    /// Lay out the visible columns of a registry for a state.
    #[must_use]
    pub fn compute<R>(registry: &ColumnRegistry<R>, state: &TableState) -> Self {
        let pins = &state.column_pinning;
        let mut ordered: Vec<(&str, Option<PinSide>)> = Vec::with_capacity(registry.len());
        ordered.extend(pins.left.iter().map(|id| (id.as_str(), Some(PinSide::Left))));
        let order: Vec<&str> = if state.column_order.is_empty() {
            registry.ids().collect()
        } else {
            state.column_order.iter().map(String::as_str).collect()
        };
        ordered.extend(
            order
                .into_iter()
                .filter(|id| pins.side_of(id).is_none())
                .map(|id| (id, None)),
        );
        ordered.extend(pins.right.iter().map(|id| (id.as_str(), Some(PinSide::Right))));

        let mut columns = Vec::with_capacity(ordered.len());
        let mut region = None;
        let mut offset = 0.0;
        for (id, pin) in ordered {
            let Some(index) = registry.index_of(id) else { continue };
            if !state.is_visible(id) {
                continue;
            }
            if region != Some(pin) {
                region = Some(pin);
                offset = 0.0;
            }
            let width = column_width(registry, state, id);
            columns.push(VisibleColumn {
                id: id.to_owned(),
                index,
                pin,
                width,
                offset,
            });
            offset += width;
        }
        Self { columns }
    }

    /// Visible column ids in display order.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|c| c.id.as_str())
    }

    /// Total width of a region (`None` = center).
    #[must_use]
    pub fn region_width(&self, pin: Option<PinSide>) -> f64 {
        self.columns.iter().filter(|c| c.pin == pin).map(|c| c.width).sum()
    }

    /// Total width of every visible column.
    #[must_use]
    pub fn total_width(&self) -> f64 {
        self.columns.iter().map(|c| c.width).sum()
    }
}

/// Current width of a column: its sized value, or its preferred width.
#[must_use]
pub fn column_width<R>(registry: &ColumnRegistry<R>, state: &TableState, id: &str) -> f64 {
    let Some(column) = registry.get(id) else {
        return 0.0;
    };
    let bounds = column.size_bounds();
    state
        .column_sizing
        .get(id)
        .map_or(f64::from(bounds.preferred), |&size| bounds.clamp(size))
}

/// Move a column to a new position within `order`. Out-of-range targets clamp
/// to the end; unknown ids leave the order unchanged.
#[must_use]
pub fn move_column(order: &[String], id: &str, to: usize) -> Vec<String> {
    let mut next = order.to_vec();
    let Some(from) = next.iter().position(|c| c == id) else {
        return next;
    };
    let column = next.remove(from);
    let to = to.min(next.len());
    next.insert(to, column);
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tabula_core::{ColumnDescriptor, SizeBounds};

    fn registry() -> ColumnRegistry<Value> {
        ColumnRegistry::new(vec![
            ColumnDescriptor::field("select").size(SizeBounds::new(40, 40, 40)),
            ColumnDescriptor::field("title"),
            ColumnDescriptor::field("status").size(SizeBounds::new(50, 100, 200)),
            ColumnDescriptor::field("actions").size(SizeBounds::new(60, 60, 60)),
        ])
        .unwrap()
    }

    #[test]
    fn pinned_regions_wrap_the_center() {
        let reg = registry();
        let mut state = TableState::default().normalized(&reg);
        state.column_pinning.pin("actions", Some(PinSide::Right));
        state.column_pinning.pin("select", Some(PinSide::Left));
        state.column_visibility.insert("status".into(), false);

        let layout = ColumnLayout::compute(&reg, &state);
        assert_eq!(layout.ids().collect::<Vec<_>>(), vec!["select", "title", "actions"]);
        assert_eq!(layout.columns[1].offset, 0.0);
        assert_eq!(layout.region_width(Some(PinSide::Left)), 40.0);
        assert_eq!(layout.total_width(), 40.0 + 150.0 + 60.0);
    }

    #[test]
    fn sizing_overrides_preferred_within_bounds() {
        let reg = registry();
        let mut state = TableState::default();
        state.column_sizing.insert("status".into(), 500.0);
        assert_eq!(column_width(&reg, &state, "status"), 200.0);
        assert_eq!(column_width(&reg, &state, "title"), 150.0);
        assert_eq!(column_width(&reg, &state, "ghost"), 0.0);

        let layout = ColumnLayout::compute(&reg, &state);
        let status = layout.columns.iter().find(|c| c.id == "status").unwrap();
        assert_eq!(status.offset, 190.0);
    }

    #[test]
    fn move_column_reorders() {
        let order: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(move_column(&order, "a", 2), vec!["b", "c", "a"]);
        assert_eq!(move_column(&order, "c", 0), vec!["c", "a", "b"]);
        assert_eq!(move_column(&order, "b", 99), vec!["a", "c", "b"]);
        assert_eq!(move_column(&order, "zz", 0), order);
    }
}
