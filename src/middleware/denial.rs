//! Policy denials and the 403 responses they produce.
//!
//! A denial is an expected outcome, not an error. Each gate builds its
//! response through [`Denial::into_response`], which also stores the
//! [`Denial`] in the response extensions. The audit interceptor, sitting
//! further out in the pipeline, reads it back to write the textual status
//! annotation instead of a bare `403`.

use std::fmt;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Response, StatusCode};

static TEXT_PLAIN: HeaderValue = HeaderValue::from_static("text/plain; charset=utf-8");

/// Reason a request was refused by a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// Outside the allowed hours.
    OutsideHours,
    /// The client's sliding window is full.
    RateLimited,
    /// Authenticated caller without a permitted role.
    RoleForbidden,
}

impl Denial {
    /// Fixed human-readable body sent to the client.
    pub fn message(self) -> &'static str {
        match self {
            Denial::OutsideHours => {
                "Access to the messaging app is restricted between 9 PM and 6 AM."
            }
            Denial::RateLimited => {
                "You have exceeded the limit of 5 messages per minute. Please wait before sending more."
            }
            Denial::RoleForbidden => "You do not have permission to perform this action.",
        }
    }

    /// Short label for the audit log status field.
    pub fn annotation(self) -> &'static str {
        match self {
            Denial::OutsideHours => "Blocked by time restriction",
            Denial::RateLimited => "Rate limit exceeded",
            Denial::RoleForbidden => "Role restriction",
        }
    }

    /// Stable identifier for metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Denial::OutsideHours => "outside_hours",
            Denial::RateLimited => "rate_limited",
            Denial::RoleForbidden => "role_forbidden",
        }
    }

    /// Status code of every denial.
    pub fn status(self) -> StatusCode {
        StatusCode::FORBIDDEN
    }

    /// Build the 403 response, tagged with this denial.
    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.message()));
        *response.status_mut() = self.status();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, TEXT_PLAIN.clone());
        response.extensions_mut().insert(self);
        response
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.status().as_u16(), self.annotation())
    }
}
