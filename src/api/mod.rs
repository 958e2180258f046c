//! Operational endpoints
//!
//! - Health check
//! - Metrics (Prometheus)

mod metrics;

use axum::{Router, routing::get};

pub use metrics::metrics_router;

use crate::AppState;

/// Create health router
///
/// `GET /health` answers while the process is up.
pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check() -> &'static str {
    "OK"
}
