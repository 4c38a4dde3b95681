//! Shared application state for Axum handlers.
//!
//! This module provides thread-safe, clonable state that is shared across
//! all request handlers and the middleware pipeline. It includes:
//!
//! - **Limiter**: The per-client sliding-window rate limiter
//! - **Audit Log**: The append-only request log
//! - **Clock**: Time source shared by the limiter and the time gate
//! - **Message Store**: In-memory store behind the `/messages` endpoints
//!
//! # Structured Concurrency
//!
//! Background tasks are managed using `tokio_util::task::TaskTracker` and
//! `CancellationToken` for proper lifecycle management. Call `shutdown()`
//! to gracefully stop all background tasks before application exit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::Config;
use crate::error::AppResult;
use crate::limiter::SlidingWindowLimiter;
use crate::metrics;
use crate::middleware::audit::RequestAuditLogger;
use crate::models::Message;

/// Shared application state for Axum handlers.
///
/// This struct is cloned for each request handler. All internal data
/// is wrapped in `Arc` for efficient sharing.
///
/// # Lifecycle
///
/// The idle-key sweeper is spawned when the state is created (if enabled).
/// Call `shutdown()` before dropping to ensure clean task termination:
///
/// ```rust,ignore
/// let audit = RequestAuditLogger::open(&config.audit_log_path).await?;
/// let state = AppState::new(config, audit, SystemClock::shared())?;
/// // ... use state ...
/// state.shutdown().await;  // Wait for background tasks to complete
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Time source for the limiter and the time gate
    pub clock: Arc<dyn Clock>,
    /// Rate limiter, `None` when rate limiting is disabled
    pub limiter: Option<Arc<SlidingWindowLimiter>>,
    /// Request audit log
    pub audit: Arc<RequestAuditLogger>,
    /// Timestamp when the application started
    pub started_at: Instant,
    messages: Arc<RwLock<Vec<Message>>>,
    /// Tracks spawned background tasks for graceful shutdown
    task_tracker: TaskTracker,
    /// Cancellation token for signaling background tasks to stop
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Create new application state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Limiter` if the rate limit settings are invalid.
    ///
    /// # Background Tasks
    ///
    /// When `RATE_LIMIT_EVICTION_INTERVAL_SECS` is non-zero this spawns a
    /// task that periodically drops idle client keys from the limiter.
    pub fn new(config: Config, audit: RequestAuditLogger, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let limiter = if config.rate_limiting_enabled() {
            Some(Arc::new(SlidingWindowLimiter::new(
                config.rate_limit_count,
                config.rate_limit_window,
            )?))
        } else {
            None
        };

        let state = Self {
            config: Arc::new(config),
            clock,
            limiter,
            audit: Arc::new(audit),
            started_at: Instant::now(),
            messages: Arc::new(RwLock::new(Vec::new())),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        if let Some(limiter) = &state.limiter
            && state.config.eviction_enabled()
        {
            state.spawn_eviction_task(limiter.clone(), state.config.rate_limit_eviction_interval);
        }

        Ok(state)
    }

    /// Append a message to the store.
    pub async fn store_message(&self, message: Message) {
        self.messages.write().await.push(message);
        metrics::record_message_stored();
    }

    /// Snapshot of all stored messages, oldest first.
    pub async fn messages(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }

    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }

    /// Client keys currently tracked by the limiter (0 when disabled).
    pub fn tracked_keys(&self) -> usize {
        self.limiter.as_ref().map_or(0, |l| l.tracked_keys())
    }

    /// Spawn the background idle-key sweeper.
    ///
    /// The task is tracked by `task_tracker` and respects `cancellation_token`
    /// for graceful shutdown.
    fn spawn_eviction_task(&self, limiter: Arc<SlidingWindowLimiter>, every: Duration) {
        let clock = self.clock.clone();
        let cancel = self.cancellation_token.clone();

        info!(interval_secs = every.as_secs(), "Idle rate limit key eviction enabled");

        self.task_tracker.spawn(async move {
            let mut ticker = interval(every);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased; // Check cancellation first

                    _ = cancel.cancelled() => {
                        debug!("Eviction task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = limiter.evict_idle(clock.now());
                        let remaining = limiter.tracked_keys();
                        metrics::set_tracked_keys(remaining);
                        debug!(evicted, remaining, "Swept idle rate limit keys");
                    }
                }
            }

            debug!("Eviction task shutting down");
        });
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// This method:
    /// 1. Signals all tasks to stop via cancellation token
    /// 2. Closes the task tracker (prevents new tasks)
    /// 3. Waits for all tasks to complete
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
