//! Time sources for the request pipeline.
//!
//! The rate limiter works on monotonic [`Instant`]s while the access gate
//! looks at the local wall-clock hour, so a clock provides both. Middleware
//! holds an `Arc<dyn Clock>`; production uses [`SystemClock`], tests drive a
//! [`ManualClock`].

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};
use parking_lot::Mutex;

/// Source of monotonic and wall-clock time.
pub trait Clock: Debug + Send + Sync {
    /// Monotonic time used for rate-limit windows.
    fn now(&self) -> Instant;

    /// Local wall-clock time used for hour-of-day gating and audit timestamps.
    fn local_time(&self) -> NaiveDateTime;
}

/// Clock backed by `Instant::now()` and `chrono::Local::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }

    /// Shared handle, the form middleware expects.
    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn local_time(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[derive(Debug)]
struct ManualTime {
    instant: Instant,
    local: NaiveDateTime,
}

/// Clock whose time only moves when told to.
///
/// Clones share the same underlying time, so a test can hand one clone to
/// the pipeline and advance another.
///
/// ```
/// use std::time::Duration;
/// use chrono::NaiveDate;
/// use messaging_gate::clock::{Clock, ManualClock};
///
/// let noon = NaiveDate::from_ymd_opt(2024, 1, 15)
///     .and_then(|d| d.and_hms_opt(12, 0, 0))
///     .unwrap();
/// let clock = ManualClock::new(noon);
/// let start = clock.now();
///
/// clock.advance(Duration::from_secs(30));
/// assert_eq!(clock.now(), start + Duration::from_secs(30));
/// assert_eq!(clock.local_time(), noon + chrono::Duration::seconds(30));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    time: Arc<Mutex<ManualTime>>,
}

impl ManualClock {
    /// Create a clock that reads `local` as the current wall-clock time.
    pub fn new(local: NaiveDateTime) -> Self {
        Self {
            time: Arc::new(Mutex::new(ManualTime {
                instant: Instant::now(),
                local,
            })),
        }
    }

    /// Move both monotonic and wall-clock time forward.
    pub fn advance(&self, by: Duration) {
        let mut time = self.time.lock();
        time.instant += by;
        time.local += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
    }

    /// Jump the wall clock to `local` without touching monotonic time.
    pub fn set_local_time(&self, local: NaiveDateTime) {
        self.time.lock().local = local;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.time.lock().instant
    }

    fn local_time(&self) -> NaiveDateTime {
        self.time.lock().local
    }
}
