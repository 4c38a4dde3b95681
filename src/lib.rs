//! # Messaging Gate
//!
//! Request pipeline for a messaging HTTP service, built on Axum and Tower:
//!
//! - **Rate Limiting**: Exact sliding-window limit on message submissions per client IP
//! - **Access Hours**: Requests refused outside configured local hours
//! - **Roles**: Authenticated callers must hold a permitted role
//! - **Audit**: One append-only log line per request, denials annotated
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Trace → CORS → Identity                                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pipeline (Audit → Time Gate → Rate Limit → Role Gate)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, stats, messages)                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  In-memory message store                                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use messaging_gate::{AppState, Config, build_router};
//! use messaging_gate::clock::SystemClock;
//! use messaging_gate::middleware::RequestAuditLogger;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let audit = RequestAuditLogger::open(&config.audit_log_path).await?;
//!
//!     let state = AppState::new(config, audit, SystemClock::shared())?;
//!     let app = build_router(state)?;
//!
//!     // Serve with `into_make_service_with_connect_info::<SocketAddr>()`...
//!     Ok(())
//! }
//! ```
//!
//! ## Tuning
//!
//! ```bash
//! RATE_LIMIT_COUNT=10 RATE_LIMIT_WINDOW_SECS=30 ACCESS_OPEN_HOUR=8 cargo run
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use limiter::{Admission, SlidingWindowLimiter};
pub use middleware::Pipeline;
pub use routes::build_router;
pub use state::AppState;
