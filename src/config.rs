//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Rate Limiting
//!
//! - `RATE_LIMIT_COUNT`: Submissions per window per client (default: 5, 0 = disabled)
//! - `RATE_LIMIT_WINDOW_SECS`: Sliding window length (default: 60)
//! - `RATE_LIMIT_METHOD` / `RATE_LIMIT_PATH` / `RATE_LIMIT_PATH_MATCH`: Which
//!   requests count (default: `POST`, `/messages`, `prefix`)
//! - `RATE_LIMIT_EVICTION_INTERVAL_SECS`: Idle key sweep interval (default: 0 = never)
//!
//! # Access Gates
//!
//! - `ACCESS_OPEN_HOUR` / `ACCESS_CLOSE_HOUR`: Local hours the API is open (default: 6 / 21)
//! - `PERMITTED_ROLES`: Comma-separated roles allowed for authenticated callers
//!
//! # Audit
//!
//! - `AUDIT_LOG_PATH`: Append-only request log (default: `requests.log`)

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use axum::http::Method;

use crate::error::{AppError, AppResult};
use crate::limiter::{DEFAULT_LIMIT, DEFAULT_WINDOW};
use crate::middleware::rate_limit::{PathMatch, RequestFilter};
use crate::middleware::role_gate::DEFAULT_PERMITTED_ROLES;
use crate::middleware::time_gate::{DEFAULT_CLOSE_HOUR, DEFAULT_OPEN_HOUR};

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Admitted submissions per window per client (default: 5)
    /// Set to 0 to disable rate limiting
    pub rate_limit_count: u32,

    /// Sliding window length (default: 60 seconds)
    pub rate_limit_window: Duration,

    /// Method subject to limiting (default: POST)
    pub rate_limit_method: Method,

    /// Path rule subject to limiting (default: "/messages")
    pub rate_limit_path: String,

    /// How `rate_limit_path` is compared (default: prefix)
    pub rate_limit_path_match: PathMatch,

    /// How often idle client keys are swept (zero = never)
    pub rate_limit_eviction_interval: Duration,

    // =========================================================================
    // Access Gate Configuration
    // =========================================================================
    /// First local hour requests are accepted (default: 6)
    pub access_open_hour: u32,

    /// First local hour requests are refused again (default: 21)
    pub access_close_hour: u32,

    /// Roles authenticated callers may hold (default: admin, moderator)
    pub permitted_roles: Vec<String>,

    // =========================================================================
    // Audit Configuration
    // =========================================================================
    /// Append-only request log location (default: "requests.log")
    pub audit_log_path: PathBuf,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Comma-separated list of allowed CORS origins
    /// Use "*" to allow all origins (not recommended for production)
    pub cors_allowed_origins: Vec<String>,

    /// Trusted proxy CIDR ranges.
    /// X-Forwarded-For headers arriving from any other peer are logged as
    /// possible spoofing.
    ///
    /// Format: Comma-separated CIDR notation (e.g., "10.0.0.0/8,172.16.0.0/12")
    /// Default: Empty (no validation)
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any configuration is invalid
    /// (e.g., non-numeric PORT value, hour out of range).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 1024 * 1024)?, // 1MB

            // Rate limiting
            rate_limit_count: Self::parse_env("RATE_LIMIT_COUNT", DEFAULT_LIMIT)?,
            rate_limit_window: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_WINDOW_SECS",
                DEFAULT_WINDOW.as_secs(),
            )?),
            rate_limit_method: Self::parse_method("RATE_LIMIT_METHOD", Method::POST)?,
            rate_limit_path: env::var("RATE_LIMIT_PATH")
                .unwrap_or_else(|_| "/messages".to_string()),
            rate_limit_path_match: Self::parse_env("RATE_LIMIT_PATH_MATCH", PathMatch::Prefix)?,
            rate_limit_eviction_interval: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_EVICTION_INTERVAL_SECS",
                0,
            )?),

            // Access gates
            access_open_hour: Self::parse_env("ACCESS_OPEN_HOUR", DEFAULT_OPEN_HOUR)?,
            access_close_hour: Self::parse_env("ACCESS_CLOSE_HOUR", DEFAULT_CLOSE_HOUR)?,
            permitted_roles: Self::parse_list("PERMITTED_ROLES")
                .unwrap_or_else(default_permitted_roles),

            // Audit
            audit_log_path: env::var("AUDIT_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("requests.log")),

            // Security
            cors_allowed_origins: Self::parse_list("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| vec!["*".to_string()]),
            trusted_proxies: Self::parse_list("TRUSTED_PROXIES").unwrap_or_default(),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    fn validate(&self) -> AppResult<()> {
        if self.rate_limiting_enabled() && self.rate_limit_window.is_zero() {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_WINDOW_SECS must be greater than 0".to_string(),
            ));
        }

        if !self.rate_limit_path.starts_with('/') {
            return Err(AppError::ConfigError(format!(
                "RATE_LIMIT_PATH must start with '/', got '{}'",
                self.rate_limit_path
            )));
        }

        for (name, hour) in [
            ("ACCESS_OPEN_HOUR", self.access_open_hour),
            ("ACCESS_CLOSE_HOUR", self.access_close_hour),
        ] {
            if hour > 23 {
                return Err(AppError::ConfigError(format!(
                    "{name} must be between 0 and 23, got {hour}"
                )));
            }
        }

        if self.access_open_hour == self.access_close_hour {
            return Err(AppError::ConfigError(format!(
                "ACCESS_OPEN_HOUR and ACCESS_CLOSE_HOUR must differ (both {})",
                self.access_open_hour
            )));
        }

        if self.permitted_roles.is_empty() {
            return Err(AppError::ConfigError(
                "PERMITTED_ROLES must name at least one role".to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if rate limiting is enabled.
    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limit_count > 0
    }

    /// Check if idle key eviction is enabled.
    pub fn eviction_enabled(&self) -> bool {
        !self.rate_limit_eviction_interval.is_zero()
    }

    /// Requests the rate limiter inspects.
    pub fn rate_limit_filter(&self) -> RequestFilter {
        RequestFilter::new(
            self.rate_limit_method.clone(),
            self.rate_limit_path.clone(),
            self.rate_limit_path_match,
        )
    }

    /// Check if trusted proxy validation is enabled.
    pub fn proxy_validation_enabled(&self) -> bool {
        !self.trusted_proxies.is_empty()
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse an HTTP method name, case-insensitively.
    fn parse_method(name: &str, default: Method) -> AppResult<Method> {
        match env::var(name) {
            Ok(val) => Method::from_bytes(val.trim().to_ascii_uppercase().as_bytes())
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a comma-separated list, `None` when unset or empty.
    fn parse_list(name: &str) -> Option<Vec<String>> {
        env::var(name)
            .ok()
            .map(|s| split_list(&s))
            .filter(|items| !items.is_empty())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn default_permitted_roles() -> Vec<String> {
    DEFAULT_PERMITTED_ROLES.iter().map(|r| r.to_string()).collect()
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_request_body_size: 1024 * 1024, // 1MB
            // Rate limiting
            rate_limit_count: DEFAULT_LIMIT,
            rate_limit_window: DEFAULT_WINDOW,
            rate_limit_method: Method::POST,
            rate_limit_path: "/messages".to_string(),
            rate_limit_path_match: PathMatch::Prefix,
            rate_limit_eviction_interval: Duration::ZERO,
            // Access gates
            access_open_hour: DEFAULT_OPEN_HOUR,
            access_close_hour: DEFAULT_CLOSE_HOUR,
            permitted_roles: default_permitted_roles(),
            // Audit
            audit_log_path: PathBuf::from("requests.log"),
            // Security
            cors_allowed_origins: vec!["*".to_string()],
            trusted_proxies: vec![],
            // Observability
            log_level: "info".to_string(),
            metrics_port: 9090,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.rate_limit_count, 5);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(config.access_open_hour, 6);
        assert_eq!(config.access_close_hour, 21);
        assert_eq!(config.permitted_roles, ["admin", "moderator"]);
        assert_eq!(config.audit_log_path, PathBuf::from("requests.log"));
        assert!(!config.eviction_enabled());
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "localhost".to_string(),
            port: 3000,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "localhost:3000");
    }

    #[test]
    fn test_rate_limiting_enabled() {
        let config = Config::default();
        assert!(config.rate_limiting_enabled());

        let config = Config {
            rate_limit_count: 0,
            ..Config::default()
        };
        assert!(!config.rate_limiting_enabled());
    }

    #[test]
    fn test_rate_limit_filter() {
        let config = Config {
            rate_limit_path_match: PathMatch::Contains,
            ..Config::default()
        };
        let filter = config.rate_limit_filter();

        assert!(filter.matches(&Method::POST, "/api/messages/"));
        assert!(!filter.matches(&Method::GET, "/api/messages/"));
    }

    #[test]
    fn test_validate_zero_window() {
        let config = Config {
            rate_limit_window: Duration::ZERO,
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("RATE_LIMIT_WINDOW_SECS"));
    }

    #[test]
    fn test_validate_zero_window_ignored_when_disabled() {
        let config = Config {
            rate_limit_count: 0,
            rate_limit_window: Duration::ZERO,
            ..Config::default()
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_hour_out_of_range() {
        let config = Config {
            access_close_hour: 24,
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("ACCESS_CLOSE_HOUR"));
    }

    #[test]
    fn test_validate_equal_hours() {
        let config = Config {
            access_open_hour: 8,
            access_close_hour: 8,
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_wrapping_hours_ok() {
        let config = Config {
            access_open_hour: 22,
            access_close_hour: 6,
            ..Config::default()
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rate_limit_path() {
        let config = Config {
            rate_limit_path: "messages".to_string(),
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("RATE_LIMIT_PATH"));
    }

    #[test]
    fn test_validate_empty_roles() {
        let config = Config {
            permitted_roles: vec![],
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" admin , ,editor"), ["admin", "editor"]);
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_metrics_addr() {
        assert_eq!(
            Config::default().metrics_addr(),
            Some("0.0.0.0:9090".parse().unwrap())
        );

        let config = Config {
            metrics_port: 0,
            ..Config::default()
        };
        assert_eq!(config.metrics_addr(), None);
    }

    #[test]
    fn test_proxy_validation_enabled() {
        assert!(!Config::default().proxy_validation_enabled());

        let config = Config {
            trusted_proxies: vec!["10.0.0.0/8".to_string()],
            ..Config::default()
        };
        assert!(config.proxy_validation_enabled());
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }
}
