//! Admission and Eviction Policy
//!
//! Sampled, frequency-based admission. When a write does not fit, a small
//! sample of stored keys is ranked by estimated frequency (least recently
//! touched first among equals) and the candidate must be at least as
//! popular as every victim it displaces. Eviction work is bounded by the
//! sample size, never by the size of the store.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::{FrequencySketch, Sampled};

/// Number of stored keys examined per admission decision.
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

/// Outcome of an admission decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Keep the candidate after evicting these keys.
    Admit(Vec<Sampled>),
    /// Drop the candidate; nothing is evicted.
    Reject,
}

// == Policy ==
/// Owns the frequency signal and the recency stamps used to break ties.
#[derive(Debug)]
pub struct Policy {
    sketch: FrequencySketch,
    /// Last-touch tick per hash slot; approximate, collisions share a slot
    recency: Box<[AtomicU64]>,
    recency_mask: u64,
    clock: AtomicU64,
    sample_size: usize,
}

impl Policy {
    // == Constructor ==
    pub fn new(counters: usize, sample_size: usize) -> Self {
        let width = counters.max(16).next_power_of_two();
        Self {
            sketch: FrequencySketch::new(counters),
            recency: (0..width).map(|_| AtomicU64::new(0)).collect(),
            recency_mask: (width - 1) as u64,
            clock: AtomicU64::new(0),
            sample_size: sample_size.max(1),
        }
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    // == Signal Application ==
    /// A read hit: bumps frequency and recency. Returns true if the
    /// frequency signal decayed as a result.
    pub fn record_access(&self, hash: u64) -> bool {
        self.stamp(hash);
        self.sketch.increment(hash)
    }

    /// A read miss: bumps frequency only, so a key that keeps being asked
    /// for has a better chance once it is written.
    pub fn record_miss(&self, hash: u64) -> bool {
        self.sketch.increment(hash)
    }

    /// An admitted write: stamps recency without counting as popularity.
    pub fn record_insert(&self, hash: u64) {
        self.stamp(hash);
    }

    /// A removed key no longer needs a recency stamp.
    pub fn forget(&self, hash: u64) {
        self.recency[self.slot(hash)].store(0, Ordering::Relaxed);
    }

    pub fn estimate(&self, hash: u64) -> u8 {
        self.sketch.estimate(hash)
    }

    fn recency(&self, hash: u64) -> u64 {
        self.recency[self.slot(hash)].load(Ordering::Relaxed)
    }

    fn stamp(&self, hash: u64) {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        self.recency[self.slot(hash)].store(tick, Ordering::Relaxed);
    }

    fn slot(&self, hash: u64) -> usize {
        (hash & self.recency_mask) as usize
    }

    // == Admission ==
    /// Decides whether a candidate needing `deficit` more cost units may
    /// displace entries from `sample`.
    ///
    /// The write itself counts as one access of the candidate. Victims are
    /// taken lowest frequency first; a candidate that ties a victim wins,
    /// being the most recently touched of the two. If the candidate is less
    /// popular than the next victim, or the whole sample cannot cover the
    /// deficit, the candidate is rejected and nothing is evicted.
    pub fn admit(&self, candidate: u64, deficit: u64, sample: Vec<Sampled>) -> Admission {
        let incoming = u16::from(self.estimate(candidate)) + 1;

        let mut ranked: Vec<(u8, u64, Sampled)> = sample
            .into_iter()
            .map(|s| (self.estimate(s.hash), self.recency(s.hash), s))
            .collect();
        ranked.sort_by_key(|(frequency, recency, _)| (*frequency, *recency));

        let mut freed = 0u64;
        let mut victims = Vec::new();
        for (frequency, _, sampled) in ranked {
            if incoming < u16::from(frequency) {
                return Admission::Reject;
            }
            freed += sampled.cost;
            victims.push(sampled);
            if freed >= deficit {
                return Admission::Admit(victims);
            }
        }
        Admission::Reject
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn sampled(name: &'static str, hash: u64, cost: u64) -> Sampled {
        Sampled {
            key: Bytes::from_static(name.as_bytes()),
            hash,
            cost,
        }
    }

    fn keys(admission: &Admission) -> Vec<&[u8]> {
        match admission {
            Admission::Admit(victims) => victims.iter().map(|v| v.key.as_ref()).collect(),
            Admission::Reject => Vec::new(),
        }
    }

    #[test]
    fn test_cold_candidate_displaces_cold_victim() {
        let policy = Policy::new(1024, DEFAULT_SAMPLE_SIZE);
        let decision = policy.admit(1, 10, vec![sampled("a", 2, 60)]);
        assert_eq!(keys(&decision), vec![b"a".as_ref()]);
    }

    #[test]
    fn test_tie_is_won_by_candidate() {
        let policy = Policy::new(1024, DEFAULT_SAMPLE_SIZE);
        policy.record_access(2);
        // Candidate estimate 0 + 1 for the write equals the victim's 1.
        let decision = policy.admit(1, 10, vec![sampled("a", 2, 60)]);
        assert!(matches!(decision, Admission::Admit(_)));
    }

    #[test]
    fn test_popular_victim_rejects_candidate() {
        let policy = Policy::new(1024, DEFAULT_SAMPLE_SIZE);
        policy.record_access(2);
        policy.record_access(2);
        let decision = policy.admit(1, 10, vec![sampled("a", 2, 60)]);
        assert_eq!(decision, Admission::Reject);
    }

    #[test]
    fn test_misses_strengthen_candidate() {
        let policy = Policy::new(1024, DEFAULT_SAMPLE_SIZE);
        policy.record_access(2);
        policy.record_access(2);
        policy.record_miss(1);
        policy.record_miss(1);
        let decision = policy.admit(1, 10, vec![sampled("a", 2, 60)]);
        assert!(matches!(decision, Admission::Admit(_)));
    }

    #[test]
    fn test_lowest_frequency_evicted_first() {
        let policy = Policy::new(1024, DEFAULT_SAMPLE_SIZE);
        policy.record_access(3);
        policy.record_miss(1);
        policy.record_miss(1);
        let decision = policy.admit(1, 5, vec![sampled("hot", 3, 10), sampled("cold", 4, 10)]);
        assert_eq!(keys(&decision), vec![b"cold".as_ref()]);
    }

    #[test]
    fn test_recency_breaks_frequency_ties() {
        let policy = Policy::new(1024, DEFAULT_SAMPLE_SIZE);
        policy.record_insert(3);
        policy.record_insert(4);
        // Both unread; 3 was touched earlier, so it goes first.
        let decision = policy.admit(1, 5, vec![sampled("newer", 4, 10), sampled("older", 3, 10)]);
        assert_eq!(keys(&decision), vec![b"older".as_ref()]);
    }

    #[test]
    fn test_accumulates_victims_until_deficit_covered() {
        let policy = Policy::new(1024, DEFAULT_SAMPLE_SIZE);
        let sample = vec![sampled("a", 2, 10), sampled("b", 3, 10), sampled("c", 4, 10)];
        let decision = policy.admit(1, 15, sample);
        assert_eq!(keys(&decision).len(), 2);
    }

    #[test]
    fn test_rejects_when_sample_cannot_cover_deficit() {
        let policy = Policy::new(1024, DEFAULT_SAMPLE_SIZE);
        let sample = vec![sampled("a", 2, 10), sampled("b", 3, 10)];
        assert_eq!(policy.admit(1, 50, sample), Admission::Reject);
        assert_eq!(policy.admit(1, 1, Vec::new()), Admission::Reject);
    }

    #[test]
    fn test_forget_clears_recency() {
        let policy = Policy::new(1024, DEFAULT_SAMPLE_SIZE);
        policy.record_insert(7);
        assert!(policy.recency(7) > 0);
        policy.forget(7);
        assert_eq!(policy.recency(7), 0);
    }
}
