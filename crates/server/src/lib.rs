//! HTTP surface of the registry sync service.
//!
//! This crate provides:
//! - The registry webhook endpoint (push and delete events)
//! - Shared-secret authentication for deliveries
//! - Liveness/readiness probes
//! - Prometheus metrics

pub mod auth;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use auth::TraceId;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
