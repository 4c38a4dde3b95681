//! Role-based access gate.
//!
//! Applies only to authenticated callers: anonymous requests (no
//! [`Identity`], or one with `is_authenticated == false`) pass straight
//! through. An authenticated caller must hold one of the permitted roles;
//! a caller with no role at all is refused.

use std::collections::HashSet;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::warn;

use super::denial::Denial;
use super::identity::{Identity, identity_of};
use crate::metrics;

/// Roles permitted by default.
pub const DEFAULT_PERMITTED_ROLES: [&str; 2] = ["admin", "moderator"];

/// Stateless role policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGate {
    permitted: HashSet<String>,
}

impl Default for RoleGate {
    fn default() -> Self {
        Self::new(DEFAULT_PERMITTED_ROLES)
    }
}

impl RoleGate {
    /// Create a gate permitting exactly `roles`.
    pub fn new<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            permitted: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `role` is in the permitted set.
    pub fn permits(&self, role: &str) -> bool {
        self.permitted.contains(role)
    }

    /// Whether a caller with `identity` may proceed.
    pub fn is_allowed(&self, identity: Option<&Identity>) -> bool {
        match identity {
            Some(identity) if identity.is_authenticated => identity
                .role
                .as_deref()
                .is_some_and(|role| self.permits(role)),
            _ => true,
        }
    }
}

/// Tower layer applying a [`RoleGate`].
#[derive(Debug, Clone)]
pub struct RoleGateLayer {
    gate: Arc<RoleGate>,
}

impl RoleGateLayer {
    pub fn new(gate: RoleGate) -> Self {
        Self {
            gate: Arc::new(gate),
        }
    }
}

impl<S> Layer<S> for RoleGateLayer {
    type Service = RoleGateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RoleGateService {
            inner,
            gate: self.gate.clone(),
        }
    }
}

/// Role gate service wrapper.
#[derive(Debug, Clone)]
pub struct RoleGateService<S> {
    inner: S,
    gate: Arc<RoleGate>,
}

impl<S> Service<Request<Body>> for RoleGateService<S>
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
        let identity = identity_of(&req);

        if !self.gate.is_allowed(identity) {
            warn!(
                user = Identity::display_name(identity),
                role = ?identity.and_then(|i| i.role.as_deref()),
                path = %req.uri().path(),
                "Role not permitted"
            );
            metrics::record_denial(Denial::RoleForbidden);
            return Box::pin(async move { Ok(Denial::RoleForbidden.into_response()) });
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}
