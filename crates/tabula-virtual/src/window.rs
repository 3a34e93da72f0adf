#![forbid(unsafe_code)]

//! Virtualization window calculator.
//!
//! Given a row count, a viewport (container size and scroll offset), a size
//! estimator, and an overscan, computes the contiguous range of rows to render
//! plus the spacer sizes before and after it.
//!
//! Rows start at their estimated size and switch to their measured size once
//! [`WindowCalculator::measure`] reports one. Offsets are prefix sums over a
//! [`FenwickTree`], so a measurement anywhere costs O(log n).
//!
//! # Invariants
//!
//! 1. `leading + sum(item sizes) + trailing == total`.
//! 2. The range covers every row intersecting the viewport, widened by
//!    overscan and clamped to `[0, row_count)`.
//! 3. `items` are contiguous: each item starts where the previous one ends.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::fenwick::FenwickTree;

/// Estimated size of a row before it has been measured.
pub type SizeEstimator = Arc<dyn Fn(usize) -> u32 + Send + Sync>;

/// One rendered row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualItem {
    pub index: usize,
    /// Offset of the row's leading edge.
    pub start: u64,
    pub size: u32,
    /// Whether `size` is a measurement rather than an estimate.
    pub measured: bool,
}

impl VirtualItem {
    #[must_use]
    pub fn end(&self) -> u64 {
        self.start + u64::from(self.size)
    }
}

/// Rows to render and the space around them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Window {
    /// Rendered rows, including overscan.
    pub range: Range<usize>,
    /// Space before the first rendered row.
    pub leading: u64,
    /// Space after the last rendered row.
    pub trailing: u64,
    /// Size of every row together.
    pub total: u64,
    pub items: Vec<VirtualItem>,
}

impl Window {
    /// Total size of the rendered rows.
    #[must_use]
    pub fn rendered_size(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.size)).sum()
    }
}

/// Where a row should land when scrolled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    /// Row's leading edge at the viewport start.
    Start,
    /// Row centered in the viewport.
    Center,
    /// Row's trailing edge at the viewport end.
    End,
    /// Scroll the least distance that makes the row fully visible.
    #[default]
    Auto,
}

/// Compute a window from scratch, with every row at its estimated size.
#[must_use]
pub fn compute_window(
    row_count: usize,
    container: u64,
    scroll: u64,
    estimator: impl Fn(usize) -> u32,
    overscan: usize,
) -> Window {
    let sizes: Vec<u32> = (0..row_count).map(estimator).collect();
    let tree = FenwickTree::from_values(&sizes);
    window_for_sizes(&tree, &[], container, scroll, overscan)
}

/// Compute a window over a size table. `measured` flags rows whose size is
/// a measurement; missing entries count as estimates.
#[must_use]
pub fn window_for_sizes(
    sizes: &FenwickTree,
    measured: &[bool],
    container: u64,
    scroll: u64,
    overscan: usize,
) -> Window {
    let n = sizes.len();
    let total = sizes.total();
    if n == 0 {
        return Window::default();
    }

    let last_offset = total.saturating_sub(1);
    let first = sizes.index_at(scroll.min(last_offset)).min(n - 1);
    let last = if container == 0 {
        first
    } else {
        let view_end = scroll.saturating_add(container - 1).min(last_offset);
        sizes.index_at(view_end).min(n - 1).max(first)
    };

    let start = first.saturating_sub(overscan);
    let end = (last + 1).saturating_add(overscan).min(n);

    let leading = sizes.prefix(start);
    let mut offset = leading;
    let items = (start..end)
        .map(|index| {
            let size = sizes.get(index);
            let item = VirtualItem {
                index,
                start: offset,
                size,
                measured: measured.get(index).copied().unwrap_or(false),
            };
            offset += u64::from(size);
            item
        })
        .collect();

    Window {
        range: start..end,
        leading,
        trailing: total - offset,
        total,
        items,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WindowKey {
    rows: usize,
    container: u64,
    scroll: u64,
    overscan: usize,
    sizes_generation: u64,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    pub computes: u64,
    pub hits: u64,
}

/// Stateful window calculator with measurement cache.
pub struct WindowCalculator {
    sizes: FenwickTree,
    measured: Vec<bool>,
    estimator: SizeEstimator,
    overscan: usize,
    sizes_generation: u64,
    cached_key: Option<WindowKey>,
    cached: Window,
    stats: WindowStats,
}

impl fmt::Debug for WindowCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowCalculator")
            .field("rows", &self.sizes.len())
            .field("overscan", &self.overscan)
            .field("sizes_generation", &self.sizes_generation)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl WindowCalculator {
    /// Calculator where every row is estimated at `estimate`.
    #[must_use]
    pub fn new(row_count: usize, estimate: u32, overscan: usize) -> Self {
        Self {
            sizes: FenwickTree::filled(row_count, estimate),
            measured: vec![false; row_count],
            estimator: Arc::new(move |_: usize| estimate),
            overscan,
            sizes_generation: 0,
            cached_key: None,
            cached: Window::default(),
            stats: WindowStats::default(),
        }
    }

    /// Calculator with a per-row estimator.
    #[must_use]
    pub fn with_estimator(row_count: usize, estimator: SizeEstimator, overscan: usize) -> Self {
        let sizes: Vec<u32> = (0..row_count).map(|i| estimator(i)).collect();
        Self {
            sizes: FenwickTree::from_values(&sizes),
            measured: vec![false; row_count],
            estimator,
            overscan,
            sizes_generation: 0,
            cached_key: None,
            cached: Window::default(),
            stats: WindowStats::default(),
        }
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.sizes.len()
    }

    #[must_use]
    pub fn overscan(&self) -> usize {
        self.overscan
    }

    #[must_use]
    pub fn stats(&self) -> WindowStats {
        self.stats
    }

    /// Size of every row together.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.sizes.total()
    }

    /// Current size of a row (measured or estimated).
    #[must_use]
    pub fn size_of(&self, index: usize) -> u32 {
        self.sizes.get(index)
    }

    #[must_use]
    pub fn is_measured(&self, index: usize) -> bool {
        self.measured.get(index).copied().unwrap_or(false)
    }

    pub fn set_overscan(&mut self, overscan: usize) {
        self.overscan = overscan;
    }

    /// Change the row count. Measurements of surviving rows are kept; new
    /// rows start at their estimate.
    pub fn set_row_count(&mut self, row_count: usize) {
        let current = self.sizes.len();
        if row_count == current {
            return;
        }
        let estimator = &self.estimator;
        self.sizes.resize_with(row_count, |i| estimator(i));
        self.measured.resize(row_count, false);
        self.sizes_generation += 1;
        tracing::debug!(from = current, to = row_count, "virtual row count changed");
    }

    /// Record a measured size. Returns `true` when it changed the layout.
    pub fn measure(&mut self, index: usize, size: u32) -> bool {
        let Some(flag) = self.measured.get_mut(index) else {
            tracing::debug!(index, "measurement for out-of-range row ignored");
            return false;
        };
        *flag = true;
        if self.sizes.get(index) == size {
            return false;
        }
        self.sizes.set(index, size);
        self.sizes_generation += 1;
        true
    }

    /// Forget every measurement; all rows return to their estimates.
    pub fn reset_measurements(&mut self) {
        let n = self.sizes.len();
        let sizes: Vec<u32> = (0..n).map(|i| (self.estimator)(i)).collect();
        self.sizes = FenwickTree::from_values(&sizes);
        self.measured = vec![false; n];
        self.sizes_generation += 1;
    }

    /// Window for a viewport. Recomputed only when the row count, viewport,
    /// overscan, or sizes changed since the last call.
    pub fn window(&mut self, container: u64, scroll: u64) -> &Window {
        let key = WindowKey {
            rows: self.sizes.len(),
            container,
            scroll,
            overscan: self.overscan,
            sizes_generation: self.sizes_generation,
        };
        if self.cached_key == Some(key) {
            self.stats.hits += 1;
            tracing::trace!(container, scroll, "window cache hit");
        } else {
            self.cached =
                window_for_sizes(&self.sizes, &self.measured, container, scroll, self.overscan);
            self.cached_key = Some(key);
            self.stats.computes += 1;
            tracing::debug!(
                start = self.cached.range.start,
                end = self.cached.range.end,
                total = self.cached.total,
                "window recomputed"
            );
        }
        &self.cached
    }

    /// Scroll offset that brings `index` into view with the given alignment.
    ///
    /// The result is clamped to `[0, total - container]`. `current` is the
    /// present scroll offset, used by [`Align::Auto`].
    #[must_use]
    pub fn offset_for_index(&self, index: usize, align: Align, container: u64, current: u64) -> u64 {
        let n = self.sizes.len();
        if n == 0 {
            return 0;
        }
        let index = index.min(n - 1);
        let start = self.sizes.prefix(index);
        let end = start + u64::from(self.sizes.get(index));
        let max_scroll = self.sizes.total().saturating_sub(container);

        let target = match align {
            Align::Start => start,
            Align::End => end.saturating_sub(container),
            Align::Center => ((start + end) / 2).saturating_sub(container / 2),
            Align::Auto => {
                if start < current {
                    start
                } else if end > current + container {
                    end.saturating_sub(container)
                } else {
                    current
                }
            }
        };
        target.min(max_scroll)
    }
}
