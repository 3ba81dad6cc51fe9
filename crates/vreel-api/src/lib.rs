//! Axum webhook server.
//!
//! This crate provides:
//! - The first-stage render callback (`POST /webhooks/render`)
//! - The overlay worker's final callback (`POST /webhooks/final`)
//! - Health checks and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use handlers::WebhookAck;
pub use routes::create_router;
pub use state::AppState;
