//! Server Module
//!
//! Serves the cache protocol over TCP. Two interchangeable strategies are
//! available and one is picked at startup:
//!
//! - `pooled`: one task per connection on a multi-threaded runtime
//! - `event_loop`: a fixed set of single-threaded loops, each multiplexing
//!   many connections with per-connection buffers
//!
//! Both reply identically to the same byte stream.

pub mod event_loop;
pub mod pooled;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::cache::Cache;
use crate::config::ServeMode;
use crate::error::Result;

pub use event_loop::Client;

// == Shutdown ==
/// Process-wide stop signal. Usable from any runtime or thread.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests the stop. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`Shutdown::trigger`] has been called.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this cannot see a closed channel.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

// == Server Context ==
/// Everything a connection needs: the shared cache and the stop signal.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub cache: Cache,
    pub shutdown: Shutdown,
}

impl ServerContext {
    pub fn new(cache: Cache) -> Self {
        Self {
            cache,
            shutdown: Shutdown::new(),
        }
    }
}

/// Serves connections from `listener` with the chosen strategy until the
/// shutdown signal fires.
pub async fn serve(listener: TcpListener, mode: ServeMode, ctx: ServerContext) -> Result<()> {
    match mode {
        ServeMode::Pooled { .. } => pooled::serve(listener, ctx).await,
        ServeMode::EventLoop { loops } => event_loop::serve(listener, loops, ctx).await,
    }
}
