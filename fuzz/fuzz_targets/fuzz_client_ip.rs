//! Fuzz testing for client key extraction and proxy range parsing.
//!
//! Both consume attacker-controlled text: `X-Forwarded-For` arrives from the
//! client, and CIDR ranges come from deployment configuration. Neither may
//! panic, and an extracted key must be admissible by the limiter.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_client_ip -- -max_total_time=60
//! ```

#![no_main]

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use libfuzzer_sys::fuzz_target;
use messaging_gate::SlidingWindowLimiter;
use messaging_gate::middleware::ip::{CidrRange, FORWARDED_FOR_HEADER, UNKNOWN_IP, identify};

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = HeaderValue::from_bytes(data) {
        let visible = value.to_str().ok().map(str::to_string);
        let mut req = Request::new(Body::empty());
        req.headers_mut().insert(FORWARDED_FOR_HEADER, value);

        let key = identify(&req);

        // The key is the first comma-separated token, taken verbatim.
        // An empty header counts as absent, and there is no peer here.
        match visible {
            Some(raw) if raw.is_empty() => assert_eq!(key, UNKNOWN_IP),
            Some(raw) => assert_eq!(key, raw.split(',').next().unwrap_or_default()),
            None => assert_eq!(key, UNKNOWN_IP),
        }

        if let Ok(limiter) = SlidingWindowLimiter::new(1, Duration::from_secs(60)) {
            let now = Instant::now();
            assert!(limiter.admit(&key, now).is_admitted());
            assert!(!limiter.admit(&key, now).is_admitted());
        }
    }

    if let Ok(s) = std::str::from_utf8(data)
        && let Some(range) = CidrRange::parse(s)
    {
        let _ = range.contains(&IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        let _ = range.contains(&IpAddr::V6(Ipv6Addr::LOCALHOST));
    }
});
