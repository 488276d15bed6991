//! Cache Store Module
//!
//! Sharded key-value map with capacity tracked in cost units. Each shard
//! has its own lock, so writers to unrelated keys rarely contend, and the
//! running cost lives in a single atomic instead of behind a map-wide lock.

use std::fmt;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use ahash::RandomState;
use bytes::Bytes;
use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard};
use rand::Rng;

use crate::cache::Entry;

/// Random draws allowed per requested sample slot before giving up on
/// filling it (draws can hit `exclude` or an already sampled key).
const MAX_DRAWS_PER_SLOT: usize = 4;

type Shard = IndexMap<Bytes, Entry>;

/// A stored key offered to the policy as an eviction candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sampled {
    pub key: Bytes,
    pub hash: u64,
    pub cost: u64,
}

// == Cache Store ==
pub struct Store {
    shards: Box<[RwLock<Shard>]>,
    mask: usize,
    hasher: RandomState,
    /// Sum of the cost of every stored entry
    used: AtomicU64,
    capacity: u64,
    entries: AtomicUsize,
}

impl Store {
    // == Constructor ==
    /// Creates a store holding at most `capacity` cost units spread over
    /// `shards` (rounded up to a power of two) shards.
    pub fn new(capacity: u64, shards: usize) -> Self {
        let shards = shards.max(1).next_power_of_two();
        Self {
            shards: (0..shards).map(|_| RwLock::new(IndexMap::new())).collect(),
            mask: shards - 1,
            hasher: RandomState::new(),
            used: AtomicU64::new(0),
            capacity,
            entries: AtomicUsize::new(0),
        }
    }

    /// Hashes a key. The same hash feeds shard selection and the policy.
    pub fn hash_key(&self, key: &[u8]) -> u64 {
        self.hasher.hash_one(key)
    }

    fn shard(&self, hash: u64) -> &RwLock<Shard> {
        // Low bits index the sketch; use high bits for shards.
        &self.shards[(hash >> 48) as usize & self.mask]
    }

    // == Get ==
    pub fn get(&self, key: &[u8], hash: u64) -> Option<Bytes> {
        self.shard(hash).read().get(key).map(Entry::value)
    }

    // == Insert ==
    /// Stores `entry` under `key` if the resulting total cost fits.
    ///
    /// The cost of any entry being replaced is credited back, so overwriting
    /// a key only needs room for the difference. On success returns the
    /// replaced entry; otherwise returns how many cost units are missing and
    /// leaves the store untouched.
    pub fn try_insert(
        &self,
        key: Bytes,
        hash: u64,
        entry: Entry,
    ) -> std::result::Result<Option<Entry>, u64> {
        let mut shard = self.shard(hash).write();
        let old_cost = shard.get(&key).map(Entry::cost).unwrap_or(0);
        let cost = entry.cost();

        // The old entry stays accounted in `used` while we hold the shard
        // lock, so `current >= old_cost` throughout.
        let reserved = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let after = current - old_cost + cost;
                (after <= self.capacity).then_some(after)
            });

        match reserved {
            Ok(_) => {
                let replaced = shard.insert(key, entry);
                if replaced.is_none() {
                    self.entries.fetch_add(1, Ordering::Relaxed);
                }
                Ok(replaced)
            }
            Err(current) => Err(current - old_cost + cost - self.capacity),
        }
    }

    // == Remove ==
    /// Removes a key, releasing its cost. Absent keys are a no-op.
    pub fn remove(&self, key: &[u8], hash: u64) -> Option<Entry> {
        let removed = self.shard(hash).write().swap_remove(key);
        if let Some(entry) = &removed {
            self.used.fetch_sub(entry.cost(), Ordering::AcqRel);
            self.entries.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    // == Sample ==
    /// Collects up to `size` distinct stored keys other than `exclude`.
    ///
    /// Each slot is drawn from a random shard at a uniformly random
    /// position, so every entry can become a candidate. Work is bounded by
    /// `size`, not by the number of entries.
    pub fn sample(&self, exclude: &[u8], size: usize) -> Vec<Sampled> {
        let mut sample: Vec<Sampled> = Vec::with_capacity(size);
        let mut rng = rand::thread_rng();
        let draws = if self.len() > size + 1 {
            size * MAX_DRAWS_PER_SLOT
        } else {
            0
        };
        for _ in 0..draws {
            if sample.len() >= size {
                break;
            }
            let start = rng.gen_range(0..self.shards.len());
            let Some(shard) = self.next_occupied(start) else {
                break;
            };
            let Some((key, entry)) = shard.get_index(rng.gen_range(0..shard.len())) else {
                continue;
            };
            if key.as_ref() == exclude || sample.iter().any(|s| s.key == *key) {
                continue;
            }
            sample.push(Sampled {
                key: key.clone(),
                hash: self.hash_key(key),
                cost: entry.cost(),
            });
        }
        self.fill_sequential(exclude, size, &mut sample);
        sample
    }

    /// First non-empty shard at or after `start`, wrapping around.
    fn next_occupied(&self, start: usize) -> Option<RwLockReadGuard<'_, Shard>> {
        (0..self.shards.len())
            .map(|step| self.shards[(start + step) & self.mask].read())
            .find(|shard| !shard.is_empty())
    }

    /// Tops `sample` up to `size` by walking the shards in order. Only
    /// small stores or unlucky draws get here.
    fn fill_sequential(&self, exclude: &[u8], size: usize, sample: &mut Vec<Sampled>) {
        for shard in self.shards.iter() {
            if sample.len() >= size {
                return;
            }
            let shard = shard.read();
            for (key, entry) in shard.iter() {
                if sample.len() >= size {
                    return;
                }
                if key.as_ref() == exclude || sample.iter().any(|s| s.key == *key) {
                    continue;
                }
                sample.push(Sampled {
                    key: key.clone(),
                    hash: self.hash_key(key),
                    cost: entry.cost(),
                });
            }
        }
    }

    // == Accessors ==
    /// Current total cost of stored entries.
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("shards", &self.shards.len())
            .field("entries", &self.len())
            .field("used", &self.used())
            .field("capacity", &self.capacity)
            .finish()
    }
}
