//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, evictions and
//! admission outcomes. Counters are relaxed atomics bumped on the hot path;
//! `CacheStats` is a point-in-time copy.

use std::sync::atomic::{AtomicU64, Ordering};

// == Metrics ==
#[derive(Debug, Default)]
pub struct Metrics {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    admitted: AtomicU64,
    rejected: AtomicU64,
    evictions: AtomicU64,
    deletes: AtomicU64,
    dropped_signals: AtomicU64,
}

impl Metrics {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admission(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    /// A write the cache chose not to keep (oversized or refused admission).
    pub fn record_rejection(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_signal(&self) {
        self.dropped_signals.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the counters. Storage figures come from the store itself.
    pub fn snapshot(&self, used_cost: u64, capacity: u64, entries: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            dropped_signals: self.dropped_signals.load(Ordering::Relaxed),
            used_cost,
            capacity,
            entries,
        }
    }
}

// == Cache Stats ==
/// Snapshot of cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals
    pub misses: u64,
    /// Number of write attempts
    pub sets: u64,
    /// Writes retained
    pub admitted: u64,
    /// Writes acknowledged but not retained
    pub rejected: u64,
    /// Entries removed to make room for others
    pub evictions: u64,
    /// Entries removed by DEL
    pub deletes: u64,
    /// Frequency updates discarded because the queue was full
    pub dropped_signals: u64,
    /// Total cost of stored entries
    pub used_cost: u64,
    /// Configured cost budget
    pub capacity: u64,
    /// Current number of entries in the cache
    pub entries: usize,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_starts_at_zero() {
        let stats = Metrics::default().snapshot(0, 100, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.capacity, 100);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let metrics = Metrics::default();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        assert_eq!(metrics.snapshot(0, 0, 0).hit_rate(), 0.75);
    }

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::default();
        metrics.record_set();
        metrics.record_admission();
        metrics.record_rejection();
        metrics.record_evictions(3);
        metrics.record_delete();
        metrics.record_dropped_signal();

        let stats = metrics.snapshot(42, 100, 2);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.admitted, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.evictions, 3);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.dropped_signals, 1);
        assert_eq!(stats.used_cost, 42);
        assert_eq!(stats.entries, 2);
    }
}
