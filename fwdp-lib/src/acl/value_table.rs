//! Dense 2-D value table and range registry (spec.md §4.3).
//!
//! `ValueTable` is a flat `rows * cols` array; `get(a, b)` is a single
//! indexed load. The compiler fills it from a list of `(a_range,
//! b_range) -> out_id` rules so that joining two already-classified
//! dimensions (e.g. src-port-id and dst-port-id) reduces to one more
//! table lookup. `RangeRegistry` maps a final `result` id to its ordered
//! action list.

use std::ops::Range;

pub struct ValueTable {
    cols: usize,
    table: Vec<u32>,
}

impl ValueTable {
    /// `rows`/`cols` are the sizes of the two joined dimensions. All
    /// cells start at `default`.
    pub fn new(rows: usize, cols: usize, default: u32) -> Self {
        Self { cols, table: vec![default; rows * cols] }
    }

    pub fn get(&self, a: u32, b: u32) -> u32 {
        self.table[a as usize * self.cols + b as usize]
    }

    /// Fill every cell in `a_range x b_range` with `out_id`. Rules are
    /// applied in order; later rules win on overlap, matching the
    /// compiler's declaration-order semantics (spec.md §4.4).
    pub fn fill_range(&mut self, a_range: Range<u32>, b_range: Range<u32>, out_id: u32) {
        for a in a_range.clone() {
            for b in b_range.clone() {
                let idx = a as usize * self.cols + b as usize;
                self.table[idx] = out_id;
            }
        }
    }
}

/// `result_id -> ordered action list` (spec.md §3 "result_registry").
#[derive(Default)]
pub struct RangeRegistry {
    actions: Vec<Vec<u32>>,
}

impl RangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an ordered action list, returning its stable id.
    pub fn push(&mut self, actions: Vec<u32>) -> u32 {
        self.actions.push(actions);
        (self.actions.len() - 1) as u32
    }

    pub fn get(&self, id: u32) -> &[u32] {
        self.actions.get(id as usize).map(Vec::as_slice).unwrap_or(&[])
    }
}
