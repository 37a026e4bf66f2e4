//! Cyclic walk over the waveform table.

use crate::waveform::WaveformTable;

pub struct Sequencer<'t> {
    table: &'t WaveformTable,
    index: usize,
}

impl<'t> Sequencer<'t> {
    pub fn new(table: &'t WaveformTable) -> Self {
        Self { table, index: 0 }
    }

    /// Sample at the current position.
    #[inline]
    pub fn current(&self) -> u16 {
        // index < len holds by construction, and tables are never empty
        self.table.as_slice()[self.index]
    }

    /// Step forward. Returns `true` when the index wrapped back to 0,
    /// i.e. a full table cycle was just completed.
    #[inline]
    pub fn advance(&mut self) -> bool {
        self.index += 1;
        if self.index == self.table.len() {
            self.index = 0;
            return true;
        }
        false
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }
}
