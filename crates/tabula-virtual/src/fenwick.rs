#![forbid(unsafe_code)]

//! Fenwick tree over row sizes.
//!
//! Stores one `u32` size per row and answers "where does row `i` start" and
//! "which row covers offset `y`" in O(log n). Sums are `u64` so a million rows
//! of large sizes cannot overflow.
//!
//! | Operation | Time |
//! |-----------|------|
//! | `from_values(values)` | O(n) |
//! | `set(i, size)` | O(log n) |
//! | `get(i)` | O(1) |
//! | `prefix(count)` | O(log n) |
//! | `index_at(offset)` | O(log n) |
//! | `resize_with(n, fill)` | O(n) |
//!
//! # Invariants
//!
//! 1. `prefix(count)` is the sum of the first `count` sizes.
//! 2. `prefix(len()) == total()`.
//! 3. `index_at(prefix(i)) == i` whenever row `i` has a non-zero size.

/// Prefix sums over row sizes.
#[derive(Debug, Clone, Default)]
pub struct FenwickTree {
    /// 1-indexed partial sums; `tree[0]` is unused.
    tree: Vec<u64>,
    /// Raw sizes, kept for O(1) reads.
    values: Vec<u32>,
}

impl FenwickTree {
    /// Tree of `n` rows, every row `fill` in size.
    #[must_use]
    pub fn filled(n: usize, fill: u32) -> Self {
        Self::from_values(&vec![fill; n])
    }

    /// Tree over the given sizes, built in O(n).
    #[must_use]
    pub fn from_values(values: &[u32]) -> Self {
        let n = values.len();
        let mut tree = vec![0u64; n + 1];
        for (i, &v) in values.iter().enumerate() {
            tree[i + 1] = u64::from(v);
        }
        for i in 1..=n {
            let parent = i + lowbit(i);
            if parent <= n {
                tree[parent] += tree[i];
            }
        }
        Self {
            tree,
            values: values.to_vec(),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Size of row `i`, or 0 past the end.
    #[inline]
    #[must_use]
    pub fn get(&self, i: usize) -> u32 {
        self.values.get(i).copied().unwrap_or(0)
    }

    /// Set the size of row `i`. Returns `false` (and does nothing) when `i`
    /// is out of range.
    pub fn set(&mut self, i: usize, size: u32) -> bool {
        let Some(slot) = self.values.get_mut(i) else {
            return false;
        };
        let old = std::mem::replace(slot, size);
        if old == size {
            return true;
        }
        let n = self.values.len();
        let mut idx = i + 1;
        while idx <= n {
            self.tree[idx] = self.tree[idx] - u64::from(old) + u64::from(size);
            idx += lowbit(idx);
        }
        true
    }

    /// Sum of the first `count` sizes. `count` is clamped to `len()`.
    #[must_use]
    pub fn prefix(&self, count: usize) -> u64 {
        let mut idx = count.min(self.values.len());
        let mut sum = 0u64;
        while idx > 0 {
            sum += self.tree[idx];
            idx -= lowbit(idx);
        }
        sum
    }

    /// Sum of every size.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.prefix(self.values.len())
    }

    /// Row covering `offset`: the `i` with `prefix(i) <= offset < prefix(i + 1)`.
    ///
    /// Returns `len()` when `offset >= total()`. Zero-size rows never cover an
    /// offset.
    #[must_use]
    pub fn index_at(&self, offset: u64) -> usize {
        let n = self.values.len();
        let mut pos = 0usize;
        let mut remaining = offset;
        let mut step = most_significant_bit(n);
        while step > 0 {
            let next = pos + step;
            if next <= n && self.tree[next] <= remaining {
                remaining -= self.tree[next];
                pos = next;
            }
            step >>= 1;
        }
        pos
    }

    /// Resize to `n` rows. Existing rows keep their sizes; new row `i` gets
    /// `fill(i)`.
    pub fn resize_with(&mut self, n: usize, mut fill: impl FnMut(usize) -> u32) {
        let current = self.values.len();
        if n == current {
            return;
        }
        let mut values = std::mem::take(&mut self.values);
        values.truncate(n);
        values.extend((current..n).map(&mut fill));
        *self = Self::from_values(&values);
    }
}

#[inline]
fn lowbit(x: usize) -> usize {
    x & x.wrapping_neg()
}

#[inline]
fn most_significant_bit(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    1 << (usize::BITS - 1 - n.leading_zeros())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_sums_match_values() {
        let ft = FenwickTree::from_values(&[3, 1, 4, 1, 5, 9, 2, 6]);
        assert_eq!(ft.prefix(0), 0);
        assert_eq!(ft.prefix(1), 3);
        assert_eq!(ft.prefix(3), 8);
        assert_eq!(ft.prefix(8), 31);
        assert_eq!(ft.prefix(100), 31);
        assert_eq!(ft.total(), 31);
    }

    #[test]
    fn set_updates_sums_and_rejects_out_of_range() {
        let mut ft = FenwickTree::filled(5, 10);
        assert!(ft.set(2, 25));
        assert_eq!(ft.get(2), 25);
        assert_eq!(ft.total(), 65);
        assert_eq!(ft.prefix(3), 45);
        assert!(!ft.set(5, 1));
        assert_eq!(ft.total(), 65);
    }

    #[test]
    fn index_at_finds_covering_row() {
        let ft = FenwickTree::from_values(&[10, 20, 30]);
        assert_eq!(ft.index_at(0), 0);
        assert_eq!(ft.index_at(9), 0);
        assert_eq!(ft.index_at(10), 1);
        assert_eq!(ft.index_at(29), 1);
        assert_eq!(ft.index_at(30), 2);
        assert_eq!(ft.index_at(59), 2);
        assert_eq!(ft.index_at(60), 3);
    }

    #[test]
    fn index_at_skips_zero_sized_rows() {
        let ft = FenwickTree::from_values(&[0, 0, 5, 0, 5]);
        assert_eq!(ft.index_at(0), 2);
        assert_eq!(ft.index_at(5), 4);
    }

    #[test]
    fn resize_keeps_existing_sizes() {
        let mut ft = FenwickTree::from_values(&[1, 2, 3]);
        ft.resize_with(5, |i| i as u32);
        assert_eq!(ft.get(3), 3);
        assert_eq!(ft.total(), 13);
        ft.resize_with(2, |_| 7);
        assert_eq!(ft.total(), 3);
        assert!(FenwickTree::default().is_empty());
        assert_eq!(FenwickTree::default().index_at(5), 0);
    }

    #[test]
    fn large_sums_do_not_overflow() {
        let ft = FenwickTree::filled(3, u32::MAX);
        assert_eq!(ft.total(), 3 * u64::from(u32::MAX));
    }
}
