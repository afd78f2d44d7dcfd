//! # Intcode Memory
//!
//! Sparse memory tape for the Intcode machine.
//!
//! Every address holds an integer. Addresses that were never written read
//! as `0`; that default is part of this type's contract rather than a side
//! effect of the container. The tape has no upper bound and grows only
//! through writes; reads never allocate.
//!
//! Negative addresses are accepted. Relative-mode arithmetic can produce
//! them and existing programs are free to use those cells like any other.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value of any cell that has never been written
pub const DEFAULT_CELL: i64 = 0;

/// Sparse address -> value store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    cells: BTreeMap<i64, i64>,
}

impl Memory {
    /// Create new empty memory
    pub fn new() -> Self {
        Self {
            cells: BTreeMap::new(),
        }
    }

    /// Load a program image starting at address 0
    pub fn from_program(program: &[i64]) -> Self {
        let cells = program
            .iter()
            .enumerate()
            .map(|(addr, &value)| (addr as i64, value))
            .collect();
        Self { cells }
    }

    /// Read a cell, yielding [`DEFAULT_CELL`] for unwritten addresses
    pub fn get(&self, addr: i64) -> i64 {
        self.cells.get(&addr).copied().unwrap_or(DEFAULT_CELL)
    }

    /// Write a cell
    pub fn set(&mut self, addr: i64, value: i64) {
        self.cells.insert(addr, value);
    }

    /// Number of cells that have been written
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells holding something other than the default, in address order
    pub fn non_default(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.cells
            .iter()
            .filter(|(_, value)| **value != DEFAULT_CELL)
            .map(|(&addr, &value)| (addr, value))
    }

    /// Read `len` consecutive cells starting at `start`
    pub fn dump(&self, start: i64, len: usize) -> Vec<i64> {
        (0..len as i64)
            .map_while(|offset| start.checked_add(offset))
            .map(|addr| self.get(addr))
            .collect()
    }
}

impl FromIterator<(i64, i64)> for Memory {
    fn from_iter<I: IntoIterator<Item = (i64, i64)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwritten_reads_default() {
        let mem = Memory::new();
        assert_eq!(mem.get(0), DEFAULT_CELL);
        assert_eq!(mem.get(1_000_000), DEFAULT_CELL);
        assert!(mem.is_empty());
    }

    #[test]
    fn test_reads_do_not_grow() {
        let mem = Memory::from_program(&[1, 2, 3]);
        let _ = mem.get(500);
        assert_eq!(mem.len(), 3);
    }

    #[test]
    fn test_store_load() {
        let mut mem = Memory::from_program(&[1, 0, 0, 0, 99]);
        assert_eq!(mem.get(4), 99);

        mem.set(10_000, 42);
        assert_eq!(mem.get(10_000), 42);
        assert_eq!(mem.len(), 6);
    }

    #[test]
    fn test_negative_addresses() {
        let mut mem = Memory::new();
        mem.set(-3, 7);
        assert_eq!(mem.get(-3), 7);
        assert_eq!(mem.get(-4), DEFAULT_CELL);
    }

    #[test]
    fn test_non_default_skips_zeros() {
        let mem = Memory::from_program(&[3, 0, 0, 4, 0]);
        let cells: Vec<_> = mem.non_default().collect();
        assert_eq!(cells, vec![(0, 3), (3, 4)]);
    }

    #[test]
    fn test_dump() {
        let mem = Memory::from_program(&[9, 8, 7]);
        assert_eq!(mem.dump(1, 4), vec![8, 7, 0, 0]);
    }
}
