//! API Routes
//!
//! Configures the Axum router for the admin endpoints.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{health_handler, stats_handler, AppState};

/// Creates the admin router.
///
/// # Endpoints
/// - `GET /stats` - Cache counters and occupancy
/// - `GET /health` - Health check endpoint
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
