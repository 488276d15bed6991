//! Frequency Sketch Module
//!
//! Approximate, decaying access counts per key hash, kept in a count-min
//! sketch. Counters are atomics so the admission path can read estimates
//! while the signal consumer writes them.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Number of independent rows (hash functions).
const DEPTH: usize = 4;

/// Counters saturate at this value (4-bit counters).
const MAX_COUNT: u8 = 15;

const SEEDS: [u64; DEPTH] = [
    0xc3a5_c85c_97cb_3127,
    0xb492_b66f_be98_f273,
    0x9ae1_6a3b_2f90_404f,
    0xcbf2_9ce4_8422_2325,
];

// == Frequency Sketch ==
/// Count-min sketch with periodic halving.
///
/// After `reset_at` increments every counter is halved, so stale popularity
/// fades instead of protecting an entry forever.
#[derive(Debug)]
pub struct FrequencySketch {
    rows: [Box<[AtomicU8]>; DEPTH],
    mask: u64,
    additions: AtomicUsize,
    reset_at: usize,
}

impl FrequencySketch {
    // == Constructor ==
    /// Creates a sketch sized for roughly `counters` distinct keys.
    pub fn new(counters: usize) -> Self {
        let width = counters.max(16).next_power_of_two();
        let rows = std::array::from_fn(|_| (0..width).map(|_| AtomicU8::new(0)).collect());
        Self {
            rows,
            mask: (width - 1) as u64,
            additions: AtomicUsize::new(0),
            reset_at: counters.max(1),
        }
    }

    /// Records one access. Returns true when this access triggered a decay.
    pub fn increment(&self, hash: u64) -> bool {
        for (row, counters) in self.rows.iter().enumerate() {
            let counter = &counters[self.index(hash, row)];
            let current = counter.load(Ordering::Relaxed);
            if current < MAX_COUNT {
                counter.store(current + 1, Ordering::Relaxed);
            }
        }

        let additions = self.additions.fetch_add(1, Ordering::Relaxed) + 1;
        if additions >= self.reset_at {
            self.reset();
            return true;
        }
        false
    }

    /// Estimated access count for a key hash.
    pub fn estimate(&self, hash: u64) -> u8 {
        self.rows
            .iter()
            .enumerate()
            .map(|(row, counters)| counters[self.index(hash, row)].load(Ordering::Relaxed))
            .min()
            .unwrap_or(0)
    }

    /// Halves every counter.
    pub fn reset(&self) {
        for counters in &self.rows {
            for counter in counters.iter() {
                let current = counter.load(Ordering::Relaxed);
                if current > 0 {
                    counter.store(current >> 1, Ordering::Relaxed);
                }
            }
        }
        self.additions.store(0, Ordering::Relaxed);
    }

    fn index(&self, hash: u64, row: usize) -> usize {
        let mixed = hash.wrapping_add(SEEDS[row]).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        ((mixed ^ (mixed >> 32)) & self.mask) as usize
    }
}
