//! Cache Module
//!
//! Provides a concurrent, cost-bounded in-memory cache with sampled
//! frequency-based admission and eviction.

mod engine;
mod entry;
mod policy;
mod sketch;
mod stats;
mod store;


// Re-export public types
pub use engine::{Cache, CacheConfig, DEFAULT_SHARDS};
pub use entry::Entry;
pub use policy::{Admission, Policy, DEFAULT_SAMPLE_SIZE};
pub use sketch::FrequencySketch;
pub use stats::{CacheStats, Metrics};
pub use store::{Sampled, Store};
