//! Sliding-log rate limiter keyed by client.
//!
//! Every admitted event is remembered with its timestamp. On each call the
//! key's log is pruned of events that have left the trailing window, and the
//! request is admitted only while fewer than `limit` events remain.
//!
//! ```text
//!            window (60s)
//!   ◄──────────────────────────────►
//! ──┼──x────x──x─────────x──────x──┼──► time
//!  now-window                     now
//!   dropped: t <= now - window     counted: (now - window, now]
//! ```
//!
//! # Concurrency
//!
//! Keys live in a sharded [`DashMap`]. The map lock is held only long enough
//! to fetch (or create) a key's `Arc<Mutex<WindowState>>`; prune, check and
//! append then happen under that key's own mutex. Two requests for the same
//! client can never both take the last slot, and different clients never
//! wait on each other's windows.
//!
//! The critical section is synchronous and contains no `.await`, so a
//! request future dropped mid-flight cannot leave a half-updated window.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, trace};

/// Default number of events allowed per window.
pub const DEFAULT_LIMIT: u32 = 5;

/// Default trailing window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Invalid limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LimiterError {
    #[error("rate limit must be greater than 0; leave the limiter out of the pipeline to disable it")]
    ZeroLimit,

    #[error("rate limit window must be longer than zero")]
    ZeroWindow,
}

/// Outcome of a single [`SlidingWindowLimiter::admit`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The event was recorded. `remaining` slots are left in the window.
    Admitted { remaining: u32 },
    /// The window is full. Nothing was recorded.
    Rejected {
        /// Time until the oldest counted event leaves the window.
        retry_after: Duration,
    },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

/// Timestamps of admitted events for one key, oldest first.
#[derive(Debug, Default)]
struct WindowState {
    events: VecDeque<Instant>,
}

impl WindowState {
    /// Drop every event at or before `now - window`.
    fn prune(&mut self, now: Instant, window: Duration) {
        // Early in process life `now - window` may precede the clock's epoch;
        // nothing can be older than that, so there is nothing to drop.
        let Some(cutoff) = now.checked_sub(window) else {
            return;
        };
        while self.events.front().is_some_and(|&t| t <= cutoff) {
            self.events.pop_front();
        }
    }
}

/// Per-key sliding-log rate limiter.
///
/// Cheap to share: wrap in an `Arc` and hand it to every service clone.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    limit: u32,
    window: Duration,
    windows: DashMap<String, Arc<Mutex<WindowState>>>,
}

impl SlidingWindowLimiter {
    /// Create a limiter allowing `limit` events per trailing `window`.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError`] if either value is zero.
    pub fn new(limit: u32, window: Duration) -> Result<Self, LimiterError> {
        if limit == 0 {
            return Err(LimiterError::ZeroLimit);
        }
        if window.is_zero() {
            return Err(LimiterError::ZeroWindow);
        }
        Ok(Self {
            limit,
            window,
            windows: DashMap::new(),
        })
    }

    /// Configured maximum events per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Configured window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Try to record an event for `key` at `now`.
    pub fn admit(&self, key: &str, now: Instant) -> Admission {
        let state = self.window_for(key);
        let mut state = state.lock();

        state.prune(now, self.window);

        let count = state.events.len();
        if count >= self.limit as usize {
            let retry_after = state
                .events
                .front()
                .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
                .unwrap_or(self.window);
            trace!(key, count, "Sliding window full");
            return Admission::Rejected { retry_after };
        }

        state.events.push_back(now);
        let remaining = self.limit.saturating_sub(state.events.len() as u32);
        trace!(key, remaining, "Event admitted");
        Admission::Admitted { remaining }
    }

    /// Number of events currently counted for `key` as of `now`.
    ///
    /// Read-only: the stored log is not pruned.
    pub fn occupancy(&self, key: &str, now: Instant) -> usize {
        let Some(state) = self.windows.get(key).map(|entry| Arc::clone(entry.value())) else {
            return 0;
        };
        let state = state.lock();
        let cutoff = now.checked_sub(self.window);
        state
            .events
            .iter()
            .filter(|&&t| cutoff.is_none_or(|cutoff| t > cutoff))
            .count()
    }

    /// Number of keys with a window allocated.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Forget keys whose windows are empty as of `now`.
    ///
    /// Returns the number of keys removed. Keys with any event still inside
    /// the window are kept, so eviction never changes an admission decision.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, state| {
            // The shard is write-locked here, so no new clones can appear.
            // Any extra reference belongs to an in-flight admit: keep it.
            if Arc::strong_count(state) > 1 {
                return true;
            }
            let mut state = state.lock();
            state.prune(now, self.window);
            !state.events.is_empty()
        });
        let evicted = before.saturating_sub(self.windows.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.windows.len(), "Evicted idle rate limit keys");
        }
        evicted
    }

    fn window_for(&self, key: &str) -> Arc<Mutex<WindowState>> {
        if let Some(existing) = self.windows.get(key) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.windows
                .entry(key.to_string())
                .or_default()
                .value(),
        )
    }
}
