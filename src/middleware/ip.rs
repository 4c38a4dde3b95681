//! Client identification for per-client rate limiting and audit lines.
//!
//! # Key Selection
//!
//! 1. `X-Forwarded-For`: the first comma-separated token, used verbatim
//!    (an empty header counts as absent)
//! 2. The transport peer address (`ConnectInfo<SocketAddr>`), IP portion only
//! 3. [`UNKNOWN_IP`] when neither is available
//!
//! The key is an opaque string. No IP syntax validation is performed, and the
//! forwarded token is not trimmed: `"1.2.3.4, 10.0.0.1"` yields `"1.2.3.4"`,
//! while `" 1.2.3.4,10.0.0.1"` yields `" 1.2.3.4"`.
//!
//! # Security Warning: IP Spoofing Risk
//!
//! **Forwarded headers are client-controlled.** A client talking to this
//! service directly can put anything in `X-Forwarded-For` and rotate keys to
//! dodge the rate limiter. Deploy behind a reverse proxy that overwrites the
//! header and block direct access:
//!
//! ```nginx
//! proxy_set_header X-Forwarded-For $remote_addr;
//! ```
//!
//! Configure `TRUSTED_PROXIES` with the proxy's CIDR ranges and the
//! identifier logs a warning whenever a forwarded header arrives from a peer
//! outside them. The header is still honoured; the warning is for operators.

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::{debug, warn};

/// Header carrying the proxy chain, originating client first.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Fallback key when no client address can be determined.
///
/// All such requests share one rate-limit window.
pub const UNKNOWN_IP: &str = "unknown";

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range for trusted proxy validation.
#[derive(Debug, Clone)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse a CIDR notation string (e.g., "10.0.0.0/8" or "::1/128").
    ///
    /// A bare address is treated as a single-host range. Returns `None` if
    /// the format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();
        let (ip, prefix_len) = match cidr.split_once('/') {
            Some((ip, prefix)) => {
                let ip: IpAddr = ip.parse().ok()?;
                let prefix_len: u8 = prefix.parse().ok()?;
                (ip, prefix_len)
            }
            None => {
                let ip: IpAddr = cidr.parse().ok()?;
                (ip, max_prefix(&ip))
            }
        };

        if prefix_len > max_prefix(&ip) {
            return None;
        }

        Some(Self {
            network: ip,
            prefix_len,
        })
    }

    /// Check if an IP address is contained within this CIDR range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

fn max_prefix(ip: &IpAddr) -> u8 {
    match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// Reverse proxies allowed to set `X-Forwarded-For`.
///
/// Empty means "trust everyone", which keeps development setups quiet.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Build from CIDR strings. Invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        if !ranges.is_empty() {
            debug!(count = ranges.len(), "Trusted proxy validation enabled");
        }

        Self { ranges }
    }

    /// Whether any ranges are configured.
    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Whether `ip` belongs to a trusted proxy (always true when disabled).
    pub fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.ranges.is_empty() || self.ranges.iter().any(|range| range.contains(ip))
    }
}

// =============================================================================
// Client Identification
// =============================================================================

/// Where a client key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientSource<'a> {
    /// First token of `X-Forwarded-For`.
    Forwarded(&'a str),
    /// Transport peer address.
    Peer(IpAddr),
    /// Nothing usable.
    NotFound,
}

#[inline]
fn peer_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

#[inline]
fn client_source<B>(req: &Request<B>) -> ClientSource<'_> {
    if let Some(forwarded) = req.headers().get(FORWARDED_FOR_HEADER)
        && let Ok(value) = forwarded.to_str()
        && !value.is_empty()
        && let Some(first) = value.split(',').next()
    {
        return ClientSource::Forwarded(first);
    }

    match peer_ip(req) {
        Some(ip) => ClientSource::Peer(ip),
        None => ClientSource::NotFound,
    }
}

/// Extract the client key for a request.
///
/// Returns `Cow::Borrowed` for the [`UNKNOWN_IP`] fallback so the common
/// "no information" path does not allocate.
#[inline]
pub fn identify<B>(req: &Request<B>) -> Cow<'static, str> {
    match client_source(req) {
        ClientSource::Forwarded(ip) => Cow::Owned(ip.to_string()),
        ClientSource::Peer(ip) => Cow::Owned(ip.to_string()),
        ClientSource::NotFound => Cow::Borrowed(UNKNOWN_IP),
    }
}

/// [`identify`], plus a warning when a forwarded header comes from a peer
/// outside the trusted proxy ranges.
pub fn identify_with_validation<B>(
    req: &Request<B>,
    trusted_proxies: &TrustedProxyConfig,
) -> Cow<'static, str> {
    match client_source(req) {
        ClientSource::Forwarded(ip) => {
            if trusted_proxies.is_enabled()
                && let Some(peer) = peer_ip(req)
                && !trusted_proxies.is_trusted(&peer)
            {
                warn!(
                    client_ip = %ip,
                    peer = %peer,
                    "X-Forwarded-For received from untrusted peer"
                );
            }
            Cow::Owned(ip.to_string())
        }
        ClientSource::Peer(ip) => Cow::Owned(ip.to_string()),
        ClientSource::NotFound => {
            debug!("No forwarded header or peer address on request");
            Cow::Borrowed(UNKNOWN_IP)
        }
    }
}
