//! Hour-of-day access gate.
//!
//! Requests are served only while the local hour lies in
//! `[open_hour, close_hour)`. With the defaults (6 and 21) the service is
//! closed from 21:00 to 05:59. If `close_hour < open_hour` the allowed range
//! wraps midnight instead, e.g. `open = 22, close = 4` serves 22:00-03:59.
//!
//! Outside the window the gate short-circuits with a 403 and never calls
//! the inner service.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use chrono::Timelike;
use thiserror::Error;
use tower::{Layer, Service};
use tracing::info;

use super::denial::Denial;
use crate::clock::Clock;
use crate::metrics;

/// Default opening hour (inclusive).
pub const DEFAULT_OPEN_HOUR: u32 = 6;

/// Default closing hour (exclusive).
pub const DEFAULT_CLOSE_HOUR: u32 = 21;

/// Invalid access window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("hour {0} is outside 0..24")]
    HourOutOfRange(u32),

    #[error("open and close hour are both {0}; the service would never be reachable")]
    EmptyWindow(u32),
}

/// Stateless time-of-day policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindowGate {
    open_hour: u32,
    close_hour: u32,
}

impl Default for TimeWindowGate {
    fn default() -> Self {
        Self {
            open_hour: DEFAULT_OPEN_HOUR,
            close_hour: DEFAULT_CLOSE_HOUR,
        }
    }
}

impl TimeWindowGate {
    /// Create a gate serving `[open_hour, close_hour)`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError`] if either hour is not in `0..24` or both are equal.
    pub fn new(open_hour: u32, close_hour: u32) -> Result<Self, GateError> {
        for hour in [open_hour, close_hour] {
            if hour >= 24 {
                return Err(GateError::HourOutOfRange(hour));
            }
        }
        if open_hour == close_hour {
            return Err(GateError::EmptyWindow(open_hour));
        }
        Ok(Self {
            open_hour,
            close_hour,
        })
    }

    pub fn open_hour(&self) -> u32 {
        self.open_hour
    }

    pub fn close_hour(&self) -> u32 {
        self.close_hour
    }

    /// Whether a request at `now` may proceed.
    pub fn is_allowed<T: Timelike>(&self, now: &T) -> bool {
        let hour = now.hour();
        if self.open_hour <= self.close_hour {
            self.open_hour <= hour && hour < self.close_hour
        } else {
            hour >= self.open_hour || hour < self.close_hour
        }
    }
}

/// Tower layer applying a [`TimeWindowGate`].
#[derive(Debug, Clone)]
pub struct TimeGateLayer {
    gate: TimeWindowGate,
    clock: Arc<dyn Clock>,
}

impl TimeGateLayer {
    pub fn new(gate: TimeWindowGate, clock: Arc<dyn Clock>) -> Self {
        Self { gate, clock }
    }

    pub fn gate(&self) -> TimeWindowGate {
        self.gate
    }
}

impl<S> Layer<S> for TimeGateLayer {
    type Service = TimeGateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeGateService {
            inner,
            gate: self.gate,
            clock: self.clock.clone(),
        }
    }
}

/// Time gate service wrapper.
#[derive(Debug, Clone)]
pub struct TimeGateService<S> {
    inner: S,
    gate: TimeWindowGate,
    clock: Arc<dyn Clock>,
}

impl<S> Service<Request<Body>> for TimeGateService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let now = self.clock.local_time();

        if !self.gate.is_allowed(&now) {
            info!(
                hour = now.hour(),
                open_hour = self.gate.open_hour,
                close_hour = self.gate.close_hour,
                path = %req.uri().path(),
                "Request outside allowed hours"
            );
            metrics::record_denial(Denial::OutsideHours);
            return Box::pin(async move { Ok(Denial::OutsideHours.into_response()) });
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}
