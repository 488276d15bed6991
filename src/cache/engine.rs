//! Cache Engine Module
//!
//! The shared cache handle: a cost-bounded store, the admission policy that
//! guards it, and the pipeline that feeds the policy its access signals.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::cache::{
    Admission, CacheStats, Entry, Metrics, Policy, Sampled, Store, DEFAULT_SAMPLE_SIZE,
};
use crate::config::{DEFAULT_COUNTERS, DEFAULT_SIGNAL_BUFFER};
use crate::tasks::{spawn_signal_task, Signal, SignalSender};

/// How many times a write retries admission when concurrent writers take
/// the room its evictions freed.
const MAX_ADMISSION_ATTEMPTS: usize = 4;

/// Default number of store shards.
pub const DEFAULT_SHARDS: usize = 64;

// == Cache Config ==
/// Tuning knobs for a [`Cache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cost budget
    pub capacity: u64,
    /// Frequency sketch width hint; also the decay period in increments
    pub counters: usize,
    /// Pending signal queue bound
    pub signal_buffer: usize,
    /// Store shard count
    pub shards: usize,
    /// Keys examined per admission decision
    pub sample_size: usize,
}

impl CacheConfig {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            counters: DEFAULT_COUNTERS,
            signal_buffer: DEFAULT_SIGNAL_BUFFER,
            shards: DEFAULT_SHARDS,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            counters: config.counters,
            signal_buffer: config.signal_buffer,
            ..Self::new(config.capacity)
        }
    }
}

// == Cache ==
/// Cloneable handle to one cache instance. Every clone shares the same
/// key space.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<Inner>,
}

struct Inner {
    store: Store,
    policy: Arc<Policy>,
    signals: SignalSender,
    metrics: Metrics,
}

impl Cache {
    // == Constructor ==
    /// Creates a cache with default tuning and the given cost budget.
    pub fn new(capacity: u64) -> Self {
        Self::with_config(CacheConfig::new(capacity))
    }

    /// Creates a cache and starts its signal pipeline. The pipeline stops
    /// when the last handle is dropped.
    pub fn with_config(config: CacheConfig) -> Self {
        let policy = Arc::new(Policy::new(config.counters, config.sample_size));
        let (signals, _handle) = spawn_signal_task(policy.clone(), config.signal_buffer);

        Self {
            inner: Arc::new(Inner {
                store: Store::new(config.capacity, config.shards),
                policy,
                signals,
                metrics: Metrics::default(),
            }),
        }
    }

    // == Get ==
    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let inner = &*self.inner;
        let hash = inner.store.hash_key(key);
        match inner.store.get(key, hash) {
            Some(value) => {
                inner.metrics.record_hit();
                self.signal(Signal::Hit(hash));
                Some(value)
            }
            None => {
                inner.metrics.record_miss();
                self.signal(Signal::Miss(hash));
                None
            }
        }
    }

    // == Set ==
    /// Stores `value` under `key` with a cost equal to the value's length.
    ///
    /// Returns whether the value was retained. Callers speaking the wire
    /// protocol acknowledge either way.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        self.insert(key, Entry::new(value))
    }

    /// Stores `value` under `key` with an explicit cost.
    pub fn set_with_cost(&self, key: Bytes, value: Bytes, cost: u64) -> bool {
        self.insert(key, Entry::with_cost(value, cost))
    }

    fn insert(&self, key: Bytes, entry: Entry) -> bool {
        self.insert_with_attempts(key, entry, MAX_ADMISSION_ATTEMPTS)
    }

    /// Tries to store `entry`, running admission between attempts. The
    /// last attempt never evicts, so victims are only removed when another
    /// insert follows.
    fn insert_with_attempts(&self, key: Bytes, entry: Entry, attempts: usize) -> bool {
        let inner = &*self.inner;
        let hash = inner.store.hash_key(&key);
        inner.metrics.record_set();

        if entry.cost() > inner.store.capacity() {
            trace!(cost = entry.cost(), "Write larger than capacity, discarding");
            self.discard(&key, hash);
            return false;
        }

        for attempt in 1..=attempts {
            let deficit = match inner.store.try_insert(key.clone(), hash, entry.clone()) {
                Ok(_) => {
                    inner.metrics.record_admission();
                    self.signal(Signal::Insert(hash));
                    return true;
                }
                Err(deficit) => deficit,
            };
            if attempt == attempts {
                break;
            }

            let sample = inner.store.sample(&key, inner.policy.sample_size());
            match inner.policy.admit(hash, deficit, sample) {
                Admission::Admit(victims) => self.evict(victims),
                Admission::Reject => break,
            }
        }

        self.discard(&key, hash);
        false
    }

    /// Drops a write the cache will not keep. Any previous value under the
    /// key goes too, so a stale value never outlives an acknowledged SET.
    fn discard(&self, key: &[u8], hash: u64) {
        self.inner.metrics.record_rejection();
        if self.inner.store.remove(key, hash).is_some() {
            self.signal(Signal::Delete(hash));
        }
    }

    fn evict(&self, victims: Vec<Sampled>) {
        let mut evicted = 0;
        for victim in victims {
            if self.inner.store.remove(&victim.key, victim.hash).is_some() {
                evicted += 1;
                self.signal(Signal::Delete(victim.hash));
            }
        }
        if evicted > 0 {
            self.inner.metrics.record_evictions(evicted);
            debug!(evicted, used = self.used_cost(), "Evicted entries");
        }
    }

    // == Delete ==
    /// Removes `key`. Returns 1 if it was present, 0 otherwise.
    pub fn delete(&self, key: &[u8]) -> usize {
        let inner = &*self.inner;
        let hash = inner.store.hash_key(key);
        let removed = inner.store.remove(key, hash).is_some();
        self.signal(Signal::Delete(hash));
        if removed {
            inner.metrics.record_delete();
            1
        } else {
            0
        }
    }

    fn signal(&self, signal: Signal) {
        if !self.inner.signals.offer(signal) {
            self.inner.metrics.record_dropped_signal();
        }
    }

    // == Observability ==
    /// Total cost currently admitted.
    pub fn used_cost(&self) -> u64 {
        self.inner.store.used()
    }

    pub fn capacity(&self) -> u64 {
        self.inner.store.capacity()
    }

    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let store = &self.inner.store;
        self.inner
            .metrics
            .snapshot(store.used(), store.capacity(), store.len())
    }

    /// Blocks until every access signal recorded so far has reached the
    /// policy.
    pub fn sync(&self) {
        self.inner.signals.sync();
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}
