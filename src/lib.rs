//! doppio - an in-memory key-value cache server
//!
//! Speaks the Redis serialization protocol and keeps values under a fixed
//! cost budget, admitting and evicting by sampled access frequency.

pub mod api;
pub mod cache;
pub mod command;
pub mod config;
pub mod error;
pub mod models;
pub mod protocol;
pub mod server;
pub mod tasks;

pub use api::AppState;
pub use cache::{Cache, CacheConfig};
pub use config::Config;
pub use error::{Error, Result};
pub use server::{ServerContext, Shutdown};
