//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (applied in order)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Cross-origin headers
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Identity     │ ← X-User-Id / X-User-Role → Identity extension
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Pipeline     │ audit → time gate → rate limit → role gate
//! └────────┬─────────┘   (403 on denial, one audit line per request)
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - `/health`, `/stats` - Health & monitoring
//! - `/messages` - Message operations

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::AppResult;
use crate::handlers;
use crate::middleware::{
    AuditLayer, IdentityLayer, Pipeline, RateLimitLayer, RoleGate, RoleGateLayer,
    TimeGateLayer, TimeWindowGate, TrustedProxyConfig,
};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
///
/// # Errors
///
/// Returns `AppError::Gate` if the access hours are invalid.
pub fn build_router(state: AppState) -> AppResult<Router> {
    let config = &state.config;

    let cors = build_cors_layer(&config.cors_allowed_origins);
    let pipeline = build_pipeline(&state)?;

    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::stats))
        .route(
            "/messages",
            get(handlers::list_messages).post(handlers::send_message),
        );

    // =========================================================================
    // Apply Middleware Stack (order matters - applied bottom to top)
    // =========================================================================

    // 1. Request body size limit (prevents DoS via large payloads)
    info!(
        max_size_kb = config.max_request_body_size / 1024,
        "Request body size limit configured"
    );
    router = router.layer(DefaultBodyLimit::max(config.max_request_body_size));

    // 2. Access pipeline
    router = router.layer(pipeline);

    // 3. Identity from the upstream authenticator
    router = router.layer(IdentityLayer::new());

    // 4. CORS
    router = router.layer(cors);

    // 5. Tracing
    router = router.layer(TraceLayer::new_for_http());

    Ok(router.with_state(state))
}

/// Assemble the interceptor chain from configuration.
///
/// # Errors
///
/// Returns `AppError::Gate` if the access hours are invalid.
pub fn build_pipeline(state: &AppState) -> AppResult<Pipeline> {
    let config = &state.config;

    let time_gate = TimeWindowGate::new(config.access_open_hour, config.access_close_hour)?;
    info!(
        open_hour = time_gate.open_hour(),
        close_hour = time_gate.close_hour(),
        "Access hours configured"
    );

    let mut pipeline = Pipeline::new()
        .with(AuditLayer::new(state.audit.clone(), state.clock.clone()))
        .with(TimeGateLayer::new(time_gate, state.clock.clone()));

    match &state.limiter {
        Some(limiter) => {
            info!(
                limit = limiter.limit(),
                window_secs = limiter.window().as_secs(),
                method = %config.rate_limit_method,
                path = %config.rate_limit_path,
                path_match = %config.rate_limit_path_match,
                proxy_validation = config.proxy_validation_enabled(),
                trusted_proxies = config.trusted_proxies.len(),
                "Rate limiting enabled"
            );
            pipeline = pipeline.with(
                RateLimitLayer::new(
                    limiter.clone(),
                    config.rate_limit_filter(),
                    state.clock.clone(),
                )
                .with_trusted_proxies(TrustedProxyConfig::new(&config.trusted_proxies)),
            );
        }
        None => info!("Rate limiting disabled (RATE_LIMIT_COUNT=0)"),
    }

    info!(roles = ?config.permitted_roles, "Role gate configured");
    pipeline = pipeline.with(RoleGateLayer::new(RoleGate::new(
        config.permitted_roles.iter().cloned(),
    )));

    Ok(pipeline)
}

/// Build CORS layer from configuration.
///
/// # Security Note
///
/// Using `*` (any origin) is convenient for development but should be
/// avoided in production. Specify explicit origins instead.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
