//! API Module
//!
//! Optional HTTP admin surface. It only reports on the cache; reads and
//! writes go through the cache protocol.
//!
//! # Endpoints
//! - `GET /stats` - Cache counters and occupancy
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

use tokio::net::TcpListener;
use tracing::info;

use crate::error::Result;
use crate::server::Shutdown;

pub use handlers::*;
pub use routes::create_router;

/// Serves the admin router on `listener` until `shutdown` fires.
pub async fn serve_admin(listener: TcpListener, state: AppState, shutdown: Shutdown) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Admin endpoints listening on http://{}", addr);
    }
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;
    Ok(())
}
