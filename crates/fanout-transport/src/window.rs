//! Window geometry and per-window loss tracking.

use fanout_core::wire::{BUFFER_SIZE, WINDOW_SIZE, WINDOW_SPAN};

/// Byte offset where `window` starts.
pub fn window_base(window: u32) -> u64 {
    window as u64 * WINDOW_SPAN
}

/// Absolute byte offset of `packet` within `window`.
pub fn packet_offset(window: u32, packet: u32) -> u64 {
    window_base(window) + packet as u64 * BUFFER_SIZE as u64
}

/// Number of *full* windows in a file of `file_size` bytes. A partially
/// filled final window is not counted. This bound is advisory;
/// termination is decided by the packet count.
pub fn total_windows(file_size: u64) -> u32 {
    (file_size / WINDOW_SPAN) as u32
}

/// Total data packets needed for a file of `file_size` bytes.
pub fn packet_count(file_size: u64) -> u32 {
    file_size.div_ceil(BUFFER_SIZE as u64) as u32
}

/// Tracks which packets of the current window have arrived.
///
/// For a truncated final window the tail past `expected` is pre-marked as
/// present so it is never reported missing. The outstanding set only ever
/// shrinks; re-marking a packet is a no-op.
pub struct WindowMap {
    have: [bool; WINDOW_SIZE],
    outstanding: usize,
}

impl WindowMap {
    /// A map expecting `expected` packets (clamped to WINDOW_SIZE).
    pub fn new(expected: usize) -> Self {
        let expected = expected.min(WINDOW_SIZE);
        let mut have = [false; WINDOW_SIZE];
        for slot in have.iter_mut().skip(expected) {
            *slot = true;
        }
        WindowMap {
            have,
            outstanding: expected,
        }
    }

    /// Mark `packet` as received. Returns true only when the packet was
    /// outstanding; duplicates and out-of-range numbers return false.
    pub fn mark(&mut self, packet: u32) -> bool {
        match self.have.get_mut(packet as usize) {
            Some(slot) if !*slot => {
                *slot = true;
                self.outstanding -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.outstanding == 0
    }

    pub fn missing_count(&self) -> usize {
        self.outstanding
    }

    /// The outstanding packet numbers, ascending.
    pub fn missing(&self) -> Vec<u32> {
        self.have
            .iter()
            .enumerate()
            .filter(|(_, &present)| !present)
            .map(|(i, _)| i as u32)
            .collect()
    }
}
