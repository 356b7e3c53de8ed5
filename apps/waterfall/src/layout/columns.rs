//! Column-height bookkeeping for the masonry layout.
//!
//! A `ColumnSet` is the only mutable geometry state the engine keeps besides the
//! tile list. Its length is the current column count at all times: it is
//! rebuilt wholesale by `reset` and only ever grown in place by `grow`.

use serde::Serialize;

/// Accumulated pixel height of every column, indexed left to right.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSet {
    heights: Vec<f64>,
}

impl ColumnSet {
    /// Creates `count` empty columns.
    pub fn new(count: usize) -> Self {
        Self {
            heights: vec![0.0; count],
        }
    }

    /// Drops every accumulated height and resizes to `count` columns.
    pub fn reset(&mut self, count: usize) {
        self.heights.clear();
        self.heights.resize(count, 0.0);
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    pub fn heights(&self) -> &[f64] {
        &self.heights
    }

    pub fn height(&self, column: usize) -> f64 {
        self.heights[column]
    }

    /// Index of the shortest column. Ties go to the lowest index.
    ///
    /// Returns 0 for an empty set so callers never index out of a zero-length
    /// layout; the engine never produces one.
    pub fn shortest(&self) -> usize {
        let mut best = 0;
        for (i, &h) in self.heights.iter().enumerate().skip(1) {
            if h < self.heights[best] {
                best = i;
            }
        }
        best
    }

    /// Height of the tallest column, 0 when empty.
    pub fn tallest_height(&self) -> f64 {
        self.heights.iter().copied().fold(0.0_f64, f64::max)
    }

    /// Adds `amount` to one column.
    pub fn grow(&mut self, column: usize, amount: f64) {
        self.heights[column] += amount;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
