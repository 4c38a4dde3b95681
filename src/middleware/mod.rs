//! HTTP interceptors for access control and auditing.
//!
//! This module provides the request pipeline guarding the messaging API:
//!
//! - **Audit**: One append-only log line per request, written after the response
//! - **Time Gate**: Refuses all requests outside permitted local hours
//! - **Rate Limiting**: Sliding-window limit on message submissions per client IP
//! - **Role Gate**: Authenticated callers must hold a permitted role
//! - **Identity**: Maps upstream authentication headers into the request
//! - **Trusted Proxy Validation**: CIDR-based proxy source validation
//!
//! # Architecture
//!
//! ```text
//! Request → Identity → Audit → Time Gate → Rate Limit → Role Gate → Handler
//!                        ↑         ↓            ↓            ↓
//!                        └──── 403 denial (annotated in the audit line)
//! ```
//!
//! The four interceptors after `Identity` form a [`Pipeline`]; its order is
//! configurable, the one above is the default.
//!
//! # Security Considerations
//!
//! - Rate limit keys come from `X-Forwarded-For`, which clients can forge
//!   unless a proxy overwrites it
//! - Trusted proxy configuration flags forwarded headers from unknown peers
//! - Identity headers must be stripped by the upstream authenticator

pub mod audit;
pub mod denial;
pub mod identity;
pub mod ip;
pub mod pipeline;
pub mod rate_limit;
pub mod role_gate;
pub mod time_gate;

pub use audit::{AuditLayer, AuditRecord, Outcome, RequestAuditLogger};
pub use denial::Denial;
pub use identity::{ANONYMOUS, Identity, IdentityLayer, identity_of};
pub use ip::{CidrRange, TrustedProxyConfig, UNKNOWN_IP, identify, identify_with_validation};
pub use pipeline::{Interceptor, Pipeline};
pub use rate_limit::{PathMatch, RateLimitLayer, RateLimitedClient, RequestFilter};
pub use role_gate::{RoleGate, RoleGateLayer};
pub use time_gate::{GateError, TimeGateLayer, TimeWindowGate};
