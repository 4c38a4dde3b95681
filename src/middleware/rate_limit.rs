//! Per-client rate limiting of message submissions.
//!
//! # Algorithm
//!
//! Backed by [`SlidingWindowLimiter`]: an exact sliding log of admitted
//! requests per client key, by default 5 per trailing 60 seconds.
//!
//! # Scope
//!
//! Only requests matching the layer's [`RequestFilter`] are counted (by
//! default `POST` to paths starting with `/messages`). Everything else
//! bypasses the limiter entirely and is never recorded.
//!
//! # Response Headers
//!
//! On rejection (403):
//! - `Retry-After`: Seconds until the oldest counted request leaves the window
//! - `X-RateLimit-Limit`: Configured requests per window
//! - `X-RateLimit-Remaining`: Always `0`
//!
//! # IP Spoofing Mitigation
//!
//! Keys come from [`identify_with_validation`]; see the `ip` module for
//! deployment requirements around `X-Forwarded-For`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderValue, Method, Request, Response};
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::denial::Denial;
use super::ip::{TrustedProxyConfig, identify_with_validation};
use crate::clock::Clock;
use crate::limiter::{Admission, SlidingWindowLimiter};
use crate::metrics;

/// Header with the configured per-window limit.
pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";

/// Header with the remaining requests in the current window.
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// How a [`RequestFilter`] compares paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathMatch {
    /// Path starts with the configured value.
    #[default]
    Prefix,
    /// Path contains the configured value anywhere.
    Contains,
}

impl FromStr for PathMatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prefix" => Ok(PathMatch::Prefix),
            "contains" => Ok(PathMatch::Contains),
            other => Err(format!("expected 'prefix' or 'contains', got '{other}'")),
        }
    }
}

impl fmt::Display for PathMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathMatch::Prefix => write!(f, "prefix"),
            PathMatch::Contains => write!(f, "contains"),
        }
    }
}

/// Selects which requests the rate limiter inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFilter {
    pub method: Method,
    pub path: String,
    pub mode: PathMatch,
}

impl Default for RequestFilter {
    fn default() -> Self {
        Self {
            method: Method::POST,
            path: "/messages".to_string(),
            mode: PathMatch::Prefix,
        }
    }
}

impl RequestFilter {
    pub fn new(method: Method, path: impl Into<String>, mode: PathMatch) -> Self {
        Self {
            method,
            path: path.into(),
            mode,
        }
    }

    /// Whether a request with `method` and `path` is subject to limiting.
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        if *method != self.method {
            return false;
        }
        match self.mode {
            PathMatch::Prefix => path.starts_with(&self.path),
            PathMatch::Contains => path.contains(&self.path),
        }
    }
}

/// Rate limiting layer for Tower middleware stack.
///
/// Clones share one limiter, so every connection and every service clone
/// counts against the same per-client windows.
///
/// # Example
///
/// ```rust,ignore
/// let limiter = Arc::new(SlidingWindowLimiter::new(5, Duration::from_secs(60))?);
/// let layer = RateLimitLayer::new(limiter, RequestFilter::default(), SystemClock::shared());
/// let app = Router::new()
///     .route("/messages", post(handler))
///     .layer(layer);
/// ```
#[derive(Debug, Clone)]
pub struct RateLimitLayer {
    limiter: Arc<SlidingWindowLimiter>,
    filter: Arc<RequestFilter>,
    clock: Arc<dyn Clock>,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl RateLimitLayer {
    pub fn new(
        limiter: Arc<SlidingWindowLimiter>,
        filter: RequestFilter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limiter,
            filter: Arc::new(filter),
            clock,
            trusted_proxies: Arc::new(TrustedProxyConfig::default()),
        }
    }

    /// Warn about forwarded headers arriving from outside these proxies.
    pub fn with_trusted_proxies(mut self, trusted_proxies: TrustedProxyConfig) -> Self {
        self.trusted_proxies = Arc::new(trusted_proxies);
        self
    }

    /// The shared limiter, e.g. for stats or idle eviction.
    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            filter: self.filter.clone(),
            clock: self.clock.clone(),
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Debug, Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<SlidingWindowLimiter>,
    filter: Arc<RequestFilter>,
    clock: Arc<dyn Clock>,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
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
        let mut inner = self.inner.clone();

        if !self.filter.matches(req.method(), req.uri().path()) {
            return Box::pin(async move { inner.call(req).await });
        }

        let client_ip = identify_with_validation(&req, &self.trusted_proxies);

        // Decided synchronously: nothing is left half-done if the future is dropped
        match self.limiter.admit(&client_ip, self.clock.now()) {
            Admission::Admitted { remaining } => {
                debug!(client_ip = %client_ip, remaining, "Message submission admitted");
                Box::pin(async move { inner.call(req).await })
            }
            Admission::Rejected { retry_after } => {
                let retry_after = retry_after_secs(retry_after);
                warn!(
                    client_ip = %client_ip,
                    path = %req.uri().path(),
                    retry_after_secs = retry_after,
                    "Rate limit exceeded for IP"
                );
                metrics::record_denial(Denial::RateLimited);

                let limit = self.limiter.limit();
                let client_ip = client_ip.into_owned();
                Box::pin(async move {
                    Ok(rate_limited_response(limit, retry_after, client_ip))
                })
            }
        }
    }
}

/// Key a rate-limit denial was charged to, carried to the audit interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitedClient(pub String);

/// Whole seconds a client must wait, rounded up and never zero.
fn retry_after_secs(wait: Duration) -> u64 {
    (wait.as_secs() + u64::from(wait.subsec_nanos() > 0)).max(1)
}

/// Build the 403 denial with rate limit headers.
fn rate_limited_response(limit: u32, retry_after_secs: u64, client_ip: String) -> Response<Body> {
    let mut response = Denial::RateLimited.into_response();
    let headers = response.headers_mut();
    headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
    headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(limit));
    headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from_static("0"));
    response
        .extensions_mut()
        .insert(RateLimitedClient(client_ip));
    response
}
