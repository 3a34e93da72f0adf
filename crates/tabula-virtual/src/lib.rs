#![forbid(unsafe_code)]

//! Row virtualization for large tables.
//!
//! [`WindowCalculator`] turns a row count, a viewport, and per-row size
//! estimates into the window of rows worth rendering. Measured sizes replace
//! estimates as rows are laid out.

pub mod fenwick;
pub mod window;

pub use fenwick::FenwickTree;
pub use window::{
    Align, SizeEstimator, VirtualItem, Window, WindowCalculator, WindowStats, compute_window,
    window_for_sizes,
};
