//! Health and statistics endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness check
//! - `GET /stats` - Limiter and message store statistics

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::models::{HealthResponse, StatsResponse};
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip_all)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// Statistics endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "tracked_keys": 12,
///   "stored_messages": 340,
///   "rate_limiting_enabled": true,
///   "uptime_seconds": 3600
/// }
/// ```
#[instrument(skip(state))]
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let tracked_keys = state.tracked_keys();
    crate::metrics::set_tracked_keys(tracked_keys);

    Json(StatsResponse {
        tracked_keys,
        stored_messages: state.message_count().await,
        rate_limiting_enabled: state.limiter.is_some(),
        uptime_seconds: state.uptime_seconds(),
    })
}
