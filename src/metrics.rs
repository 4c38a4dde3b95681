//! Prometheus metrics for application observability.
//!
//! Metrics are exposed via a dedicated HTTP listener (default: `0.0.0.0:9090`).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `messaging_gate_requests_admitted_total` - Requests that passed every gate
//! - `messaging_gate_denials_total` - Requests refused (label: reason)
//! - `messaging_gate_audit_write_failures_total` - Audit lines that could not be written
//! - `messaging_gate_messages_stored_total` - Messages accepted by the API
//!
//! ## Gauges
//! - `messaging_gate_rate_limit_tracked_keys` - Client keys held by the limiter
//!
//! # Usage
//!
//! ```rust,ignore
//! use messaging_gate::metrics::{init_metrics, record_denial};
//!
//! // Initialize metrics (call once at startup)
//! init_metrics("0.0.0.0:9090".parse()?)?;
//!
//! record_denial(Denial::RateLimited);
//! ```
//!
//! Recording functions are no-ops until a recorder is installed.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

use crate::middleware::denial::Denial;

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_ADMITTED_TOTAL: &str = "messaging_gate_requests_admitted_total";
    pub const DENIALS_TOTAL: &str = "messaging_gate_denials_total";
    pub const AUDIT_WRITE_FAILURES_TOTAL: &str = "messaging_gate_audit_write_failures_total";
    pub const MESSAGES_STORED_TOTAL: &str = "messaging_gate_messages_stored_total";
    pub const RATE_LIMIT_TRACKED_KEYS: &str = "messaging_gate_rate_limit_tracked_keys";
}

/// Initialize the Prometheus metrics exporter.
///
/// # Errors
///
/// Fails if a recorder is already installed or the listener cannot bind.
pub fn init_metrics(metrics_addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::REQUESTS_ADMITTED_TOTAL,
        "Total number of requests that passed every gate"
    );
    describe_counter!(
        names::DENIALS_TOTAL,
        "Total number of requests refused, by reason"
    );
    describe_counter!(
        names::AUDIT_WRITE_FAILURES_TOTAL,
        "Total number of audit lines that failed to write"
    );
    describe_counter!(
        names::MESSAGES_STORED_TOTAL,
        "Total number of messages accepted"
    );
    describe_gauge!(
        names::RATE_LIMIT_TRACKED_KEYS,
        "Number of client keys currently tracked by the rate limiter"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record a request refused by one of the gates.
pub fn record_denial(denial: Denial) {
    counter!(names::DENIALS_TOTAL, "reason" => denial.as_str()).increment(1);
}

/// Record a request that reached the handler.
pub fn record_admitted() {
    counter!(names::REQUESTS_ADMITTED_TOTAL).increment(1);
}

/// Record an audit line that could not be written.
pub fn record_audit_write_failure() {
    counter!(names::AUDIT_WRITE_FAILURES_TOTAL).increment(1);
}

pub fn record_message_stored() {
    counter!(names::MESSAGES_STORED_TOTAL).increment(1);
}

/// Update the tracked-keys gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_tracked_keys(count: usize) {
    gauge!(names::RATE_LIMIT_TRACKED_KEYS).set(count as f64);
}
