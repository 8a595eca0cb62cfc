//! LC-3 memory subsystem.
//!
//! A flat, word-addressed array of 65536 sixteen-bit cells. Addresses are
//! `u16`, so every address is in range by construction; address arithmetic
//! wraps modulo 65536.

use serde::{Deserialize, Serialize};

/// Number of memory cells (the full 16-bit address space).
pub const MEMORY_SIZE: usize = 0x10000;

/// LC-3 memory: 65536 sixteen-bit cells, zeroed at creation.
#[derive(Clone, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<u16>,
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE],
        }
    }

    /// Read the cell at `addr`.
    #[inline]
    pub fn read(&self, addr: u16) -> u16 {
        self.cells[addr as usize]
    }

    /// Write the cell at `addr`.
    #[inline]
    pub fn write(&mut self, addr: u16, value: u16) {
        self.cells[addr as usize] = value;
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Write a block of words starting at `start`, one cell per word.
    ///
    /// Addresses wrap at the 64K boundary, matching plain sequential
    /// writes; later writes win on overlap.
    pub fn write_block(&mut self, start: u16, words: &[u16]) {
        let mut addr = start;
        for &word in words {
            self.cells[addr as usize] = word;
            addr = addr.wrapping_add(1);
        }
    }

    /// Dump a range of memory as (address, value) pairs (for debugging).
    pub fn dump(&self, start: u16, count: usize) -> Vec<(u16, u16)> {
        (0..count)
            .map(|i| {
                let addr = start.wrapping_add(i as u16);
                (addr, self.cells[addr as usize])
            })
            .collect()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only summarize: 64K cells are too many to print
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}
