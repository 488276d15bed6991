//! API Handlers
//!
//! HTTP request handlers for the admin endpoints.

use axum::{extract::State, Json};

use crate::cache::Cache;
use crate::models::{HealthResponse, StatsResponse};

/// Application state shared across all handlers.
///
/// The cache handle is cheap to clone and internally synchronized.
#[derive(Clone, Debug)]
pub struct AppState {
    pub cache: Cache,
}

impl AppState {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }
}

/// Handler for GET /stats
///
/// Returns a snapshot of the cache counters.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.cache.stats()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_stats_handler() {
        let cache = Cache::new(100);
        cache.set(Bytes::from_static(b"k"), Bytes::from_static(b"value"));
        cache.get(b"k");
        cache.get(b"missing");

        let response = stats_handler(State(AppState::new(cache))).await;
        assert_eq!(response.hits, 1);
        assert_eq!(response.misses, 1);
        assert_eq!(response.used_cost, 5);
        assert_eq!(response.entries, 1);
        assert_eq!(response.capacity, 100);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
