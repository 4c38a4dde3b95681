//! Caller identity as seen by the pipeline.
//!
//! Authentication happens upstream (an API gateway or auth proxy). The
//! pipeline only needs the outcome: an [`Identity`] in the request
//! extensions. A request without one is anonymous.
//!
//! [`IdentityLayer`] is the bridge used by the bundled server: it maps the
//! headers set by the upstream authenticator into an [`Identity`].
//!
//! ```bash
//! curl -H "X-User-Id: alice" -H "X-User-Role: moderator" http://localhost:3000/messages
//! ```

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::debug;

/// Header carrying the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the authenticated user's role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Display name for callers without an authenticated identity.
pub const ANONYMOUS: &str = "Anonymous";

/// Authenticated principal attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub role: Option<String>,
    pub is_authenticated: bool,
}

impl Identity {
    /// An authenticated user with an optional role.
    pub fn authenticated(id: impl Into<String>, role: Option<&str>) -> Self {
        Self {
            id: id.into(),
            role: role.map(str::to_string),
            is_authenticated: true,
        }
    }

    /// Name for audit lines: the id when authenticated, [`ANONYMOUS`] otherwise.
    pub fn display_name(identity: Option<&Identity>) -> &str {
        match identity {
            Some(identity) if identity.is_authenticated => &identity.id,
            _ => ANONYMOUS,
        }
    }
}

/// Read the identity attached to a request, if any.
pub fn identity_of<B>(req: &Request<B>) -> Option<&Identity> {
    req.extensions().get::<Identity>()
}

/// Build an identity from upstream headers.
///
/// Returns `None` when the id header is missing, empty or not UTF-8.
fn identity_from_headers<B>(req: &Request<B>) -> Option<Identity> {
    let id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())?;

    let role = req
        .headers()
        .get(USER_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    Some(Identity::authenticated(id, role))
}

/// Layer that attaches an [`Identity`] built from upstream headers.
#[derive(Debug, Clone, Default)]
pub struct IdentityLayer;

impl IdentityLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for IdentityLayer {
    type Service = IdentityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IdentityService { inner }
    }
}

/// Identity mapping service wrapper.
#[derive(Debug, Clone)]
pub struct IdentityService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for IdentityService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // An identity set further out (e.g. by tests) takes precedence
        if identity_of(&req).is_none()
            && let Some(identity) = identity_from_headers(&req)
        {
            debug!(user = %identity.id, role = ?identity.role, "Attached upstream identity");
            req.extensions_mut().insert(identity);
        }
        self.inner.call(req)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_headers() {
        let req = Request::builder()
            .header("x-user-id", "alice")
            .header("x-user-role", "moderator")
            .body(Body::empty())
            .unwrap();

        assert_eq!(
            identity_from_headers(&req),
            Some(Identity::authenticated("alice", Some("moderator")))
        );
    }

    #[test]
    fn test_identity_without_role() {
        let req = Request::builder()
            .header("x-user-id", "bob")
            .body(Body::empty())
            .unwrap();

        let identity = identity_from_headers(&req).unwrap();
        assert!(identity.is_authenticated);
        assert_eq!(identity.role, None);
    }

    #[test]
    fn test_missing_or_blank_id_is_anonymous() {
        let req = Request::builder()
            .header("x-user-role", "admin")
            .body(Body::empty())
            .unwrap();
        assert!(identity_from_headers(&req).is_none());

        let req = Request::builder()
            .header("x-user-id", "   ")
            .body(Body::empty())
            .unwrap();
        assert!(identity_from_headers(&req).is_none());
    }

    #[test]
    fn test_display_name() {
        let alice = Identity::authenticated("alice", None);
        let guest = Identity {
            id: "guest".to_string(),
            role: None,
            is_authenticated: false,
        };

        assert_eq!(Identity::display_name(Some(&alice)), "alice");
        assert_eq!(Identity::display_name(Some(&guest)), ANONYMOUS);
        assert_eq!(Identity::display_name(None), ANONYMOUS);
    }
}
