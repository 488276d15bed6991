//! Response models for the HTTP admin endpoints.

pub mod responses;

pub use responses::{HealthResponse, StatsResponse};
