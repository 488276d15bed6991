//! Response DTOs for the admin API
//!
//! JSON bodies returned by `/stats` and `/health`.

use serde::Serialize;

use crate::cache::CacheStats;

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Reads that found a value
    pub hits: u64,
    /// Reads that found nothing
    pub misses: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Write attempts, retained or not
    pub sets: u64,
    /// Writes retained
    pub admitted: u64,
    /// Writes acknowledged but not retained
    pub rejected: u64,
    /// Entries removed to make room
    pub evictions: u64,
    /// Entries removed by DEL
    pub deletes: u64,
    /// Frequency updates lost to a full queue
    pub dropped_signals: u64,
    /// Cost currently admitted
    pub used_cost: u64,
    /// Configured cost budget
    pub capacity: u64,
    /// Current number of entries
    pub entries: usize,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            sets: stats.sets,
            admitted: stats.admitted,
            rejected: stats.rejected,
            evictions: stats.evictions,
            deletes: stats.deletes,
            dropped_signals: stats.dropped_signals,
            used_cost: stats.used_cost,
            capacity: stats.capacity,
            entries: stats.entries,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in RFC 3339 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
