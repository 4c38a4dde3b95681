//! Ordered composition of the request interceptors.
//!
//! A [`Pipeline`] is a list of [`Interceptor`]s applied first-to-last around
//! a final handler:
//!
//! ```text
//! handle(req) → I1 → I2 → … → In → final handler
//!                │    │         │
//!                └────┴── any interceptor may answer directly (short-circuit)
//! ```
//!
//! Each interceptor receives the rest of the chain as its inner service.
//! Gates answer before delegating; the audit interceptor delegates first and
//! observes the result on the way back out. The chain is built once per
//! [`Layer::layer`] call into a boxed service, so its order is data, not a
//! type, and can come from configuration.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceExt};

use super::audit::{AuditLayer, RequestAuditLogger};
use super::rate_limit::{RateLimitLayer, RequestFilter};
use super::role_gate::{RoleGate, RoleGateLayer};
use super::time_gate::{TimeGateLayer, TimeWindowGate};
use crate::clock::Clock;
use crate::limiter::SlidingWindowLimiter;

/// Type-erased request handler, the shape every stage of the chain takes.
pub type BoxHandler<E> = BoxCloneSyncService<Request<Body>, Response<Body>, E>;

/// One stage of the pipeline.
#[derive(Debug, Clone)]
pub enum Interceptor {
    Audit(AuditLayer),
    TimeGate(TimeGateLayer),
    RateLimit(RateLimitLayer),
    RoleGate(RoleGateLayer),
}

impl Interceptor {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Interceptor::Audit(_) => "audit",
            Interceptor::TimeGate(_) => "time_gate",
            Interceptor::RateLimit(_) => "rate_limit",
            Interceptor::RoleGate(_) => "role_gate",
        }
    }

    /// Put this interceptor in front of `next`.
    fn wrap<E>(&self, next: BoxHandler<E>) -> BoxHandler<E>
    where
        E: Send + 'static,
    {
        match self {
            Interceptor::Audit(layer) => BoxCloneSyncService::new(layer.layer(next)),
            Interceptor::TimeGate(layer) => BoxCloneSyncService::new(layer.layer(next)),
            Interceptor::RateLimit(layer) => BoxCloneSyncService::new(layer.layer(next)),
            Interceptor::RoleGate(layer) => BoxCloneSyncService::new(layer.layer(next)),
        }
    }
}

impl From<AuditLayer> for Interceptor {
    fn from(layer: AuditLayer) -> Self {
        Interceptor::Audit(layer)
    }
}

impl From<TimeGateLayer> for Interceptor {
    fn from(layer: TimeGateLayer) -> Self {
        Interceptor::TimeGate(layer)
    }
}

impl From<RateLimitLayer> for Interceptor {
    fn from(layer: RateLimitLayer) -> Self {
        Interceptor::RateLimit(layer)
    }
}

impl From<RoleGateLayer> for Interceptor {
    fn from(layer: RoleGateLayer) -> Self {
        Interceptor::RoleGate(layer)
    }
}

/// Ordered chain of interceptors.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = Pipeline::new()
///     .with(AuditLayer::new(logger, clock.clone()))
///     .with(TimeGateLayer::new(TimeWindowGate::default(), clock.clone()))
///     .with(RateLimitLayer::new(limiter, RequestFilter::default(), clock));
///
/// let response = pipeline.handle(request, service_fn(handler)).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    interceptors: Vec<Interceptor>,
}

impl Pipeline {
    /// An empty pipeline: every request goes straight to the handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor; it runs after all previously added ones.
    pub fn with(mut self, interceptor: impl Into<Interceptor>) -> Self {
        self.interceptors.push(interceptor.into());
        self
    }

    /// Standard chain: audit → time gate → rate limit → role gate.
    pub fn standard(
        logger: Arc<RequestAuditLogger>,
        time_gate: TimeWindowGate,
        limiter: Arc<SlidingWindowLimiter>,
        filter: RequestFilter,
        role_gate: RoleGate,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new()
            .with(AuditLayer::new(logger, clock.clone()))
            .with(TimeGateLayer::new(time_gate, clock.clone()))
            .with(RateLimitLayer::new(limiter, filter, clock))
            .with(RoleGateLayer::new(role_gate))
    }

    pub fn interceptors(&self) -> &[Interceptor] {
        &self.interceptors
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run one request through the chain and `final_handler`.
    ///
    /// Exactly one response comes back: either a short-circuit from an
    /// interceptor or whatever the handler produced.
    pub async fn handle<S>(
        &self,
        request: Request<Body>,
        final_handler: S,
    ) -> Result<Response<Body>, S::Error>
    where
        S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
        S::Error: Send + 'static,
    {
        self.layer(final_handler).oneshot(request).await
    }
}

impl<S> Layer<S> for Pipeline
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Service = BoxHandler<S::Error>;

    fn layer(&self, inner: S) -> Self::Service {
        self.interceptors
            .iter()
            .rev()
            .fold(BoxCloneSyncService::new(inner), |next, interceptor| {
                interceptor.wrap(next)
            })
    }
}
