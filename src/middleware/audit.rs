//! Append-only request audit log.
//!
//! One line per request that reaches the audit interceptor:
//!
//! ```text
//! 2024-01-15 10:30:00.123456 - User: alice - Method: POST - Path: /messages - Status: 201
//! 2024-01-15 22:01:10.000001 - User: Anonymous - Method: GET - Path: /messages - Status: 403 (Blocked by time restriction)
//! 2024-01-15 10:30:05.500000 - User: Anonymous - IP: 1.2.3.4 - Method: POST - Path: /messages - Status: 403 (Rate limit exceeded)
//! ```
//!
//! The interceptor delegates first and writes the line once the downstream
//! response is known, so the status is the final one. Denials produced by
//! inner gates are recognised through the [`Denial`] response extension and
//! written with their annotation.
//!
//! # Failure Handling
//!
//! Writing the audit log must never fail a request. Write errors are logged
//! with `tracing`, counted in metrics, and otherwise ignored.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use chrono::NaiveDateTime;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tower::{Layer, Service};
use tracing::warn;

use super::denial::Denial;
use super::identity::identity_of;
use super::rate_limit::RateLimitedClient;
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::metrics;

/// Timestamp layout of audit lines (local time, microseconds).
///
/// The fraction is always written, `.000000` included, so every line has the
/// same width and sorts lexically.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Response produced downstream.
    Status(StatusCode),
    /// Refused by a gate.
    Denied(Denial),
}

impl Outcome {
    /// Derive the outcome from a finished response.
    pub fn of<B>(response: &Response<B>) -> Self {
        match response.extensions().get::<Denial>() {
            Some(denial) => Outcome::Denied(*denial),
            None => Outcome::Status(response.status()),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Status(status) => write!(f, "{}", status.as_u16()),
            Outcome::Denied(denial) => write!(f, "{denial}"),
        }
    }
}

/// One audit log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub timestamp: NaiveDateTime,
    /// Authenticated user id; `None` is written as `Anonymous`.
    pub user: Option<String>,
    /// Client key, written only when present.
    pub client_ip: Option<String>,
    pub method: Method,
    pub path: String,
    pub outcome: Outcome,
}

impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - User: {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.user.as_deref().unwrap_or(super::identity::ANONYMOUS)
        )?;
        if let Some(ip) = &self.client_ip {
            write!(f, " - IP: {ip}")?;
        }
        write!(
            f,
            " - Method: {} - Path: {} - Status: {}",
            self.method, self.path, self.outcome
        )
    }
}

/// Durable, append-only sink for [`AuditRecord`]s.
///
/// Each record is written as a single `write_all` while holding the file
/// lock, so concurrent requests never interleave within a line and lines
/// appear in the order `record` acquired the lock.
#[derive(Debug)]
pub struct RequestAuditLogger {
    path: PathBuf,
    file: Mutex<File>,
}

impl RequestAuditLogger {
    /// Open (or create) the log at `path` for appending.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::AuditSink`] if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| AppError::AuditSink {
                path: path.display().to_string(),
                source,
            })?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line. Never fails from the caller's point of view.
    pub async fn record(&self, record: &AuditRecord) {
        let line = format!("{record}\n");

        let mut file = self.file.lock().await;
        let result: std::io::Result<()> = async {
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!(
                error = %e,
                path = %self.path.display(),
                "Failed to write audit record"
            );
            metrics::record_audit_write_failure();
        }
    }
}

/// Tower layer that writes one [`AuditRecord`] per request.
#[derive(Debug, Clone)]
pub struct AuditLayer {
    logger: Arc<RequestAuditLogger>,
    clock: Arc<dyn Clock>,
}

impl AuditLayer {
    pub fn new(logger: Arc<RequestAuditLogger>, clock: Arc<dyn Clock>) -> Self {
        Self { logger, clock }
    }
}

impl<S> Layer<S> for AuditLayer {
    type Service = AuditService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuditService {
            inner,
            logger: self.logger.clone(),
            clock: self.clock.clone(),
        }
    }
}

/// Audit service wrapper.
#[derive(Debug, Clone)]
pub struct AuditService<S> {
    inner: S,
    logger: Arc<RequestAuditLogger>,
    clock: Arc<dyn Clock>,
}

impl<S> Service<Request<Body>> for AuditService<S>
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
        // Capture what the line needs before the request moves downstream
        let user = identity_of(&req)
            .filter(|identity| identity.is_authenticated)
            .map(|identity| identity.id.clone());
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let logger = self.logger.clone();
        let clock = self.clock.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let response = inner.call(req).await?;

            let record = AuditRecord {
                timestamp: clock.local_time(),
                user,
                client_ip: response
                    .extensions()
                    .get::<RateLimitedClient>()
                    .map(|RateLimitedClient(ip)| ip.clone()),
                method,
                path,
                outcome: Outcome::of(&response),
            };
            if matches!(record.outcome, Outcome::Status(_)) {
                metrics::record_admitted();
            }
            logger.record(&record).await;

            Ok(response)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_micro_opt(10, 30, 0, 123_456)
            .unwrap()
    }

    fn temp_log() -> PathBuf {
        std::env::temp_dir().join(format!("audit-{}.log", Uuid::new_v4()))
    }

    #[test]
    fn test_status_line_format() {
        let record = AuditRecord {
            timestamp: timestamp(),
            user: Some("alice".to_string()),
            client_ip: None,
            method: Method::POST,
            path: "/messages".to_string(),
            outcome: Outcome::Status(StatusCode::CREATED),
        };

        assert_eq!(
            record.to_string(),
            "2024-01-15 10:30:00.123456 - User: alice - Method: POST - Path: /messages - Status: 201"
        );
    }

    #[test]
    fn test_denial_line_format() {
        let record = AuditRecord {
            timestamp: timestamp(),
            user: None,
            client_ip: Some("1.2.3.4".to_string()),
            method: Method::POST,
            path: "/messages".to_string(),
            outcome: Outcome::Denied(Denial::RateLimited),
        };

        assert_eq!(
            record.to_string(),
            "2024-01-15 10:30:00.123456 - User: Anonymous - IP: 1.2.3.4 - Method: POST \
             - Path: /messages - Status: 403 (Rate limit exceeded)"
        );
    }

    #[test]
    fn test_whole_second_keeps_fraction() {
        let record = AuditRecord {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(6, 0, 0)
                .unwrap(),
            user: None,
            client_ip: None,
            method: Method::GET,
            path: "/health".to_string(),
            outcome: Outcome::Status(StatusCode::OK),
        };

        assert!(record.to_string().starts_with("2024-01-15 06:00:00.000000 - User: Anonymous"));
    }

    #[test]
    fn test_outcome_reads_denial_extension() {
        let denied = Denial::RoleForbidden.into_response();
        assert_eq!(Outcome::of(&denied), Outcome::Denied(Denial::RoleForbidden));

        let plain = Response::builder()
            .status(StatusCode::FORBIDDEN)
            .body(Body::empty())
            .unwrap();
        assert_eq!(Outcome::of(&plain), Outcome::Status(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_record_appends_lines_in_order() {
        let path = temp_log();
        let logger = RequestAuditLogger::open(&path).await.unwrap();

        for code in [StatusCode::OK, StatusCode::CREATED] {
            logger
                .record(&AuditRecord {
                    timestamp: timestamp(),
                    user: None,
                    client_ip: None,
                    method: Method::GET,
                    path: "/messages".to_string(),
                    outcome: Outcome::Status(code),
                })
                .await;
        }

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("Status: 200"));
        assert!(lines[1].ends_with("Status: 201"));

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_open_fails_for_missing_directory() {
        let path = std::env::temp_dir()
            .join(Uuid::new_v4().to_string())
            .join("requests.log");

        let err = RequestAuditLogger::open(&path).await.unwrap_err();
        assert!(matches!(err, AppError::AuditSink { .. }));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_write_failure_does_not_fail_request() {
        use crate::clock::ManualClock;
        use std::convert::Infallible;
        use tower::{ServiceExt, service_fn};

        // Opens fine, every write fails with ENOSPC
        let logger = Arc::new(RequestAuditLogger::open("/dev/full").await.unwrap());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(timestamp()));

        let service = AuditLayer::new(logger, clock).layer(service_fn(|_req: Request<Body>| async {
            Ok::<_, Infallible>(
                Response::builder()
                    .status(StatusCode::CREATED)
                    .header("x-handler", "messages")
                    .body(Body::from("stored"))
                    .unwrap(),
            )
        }));

        let request = Request::builder()
            .method("POST")
            .uri("/messages")
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-handler"], "messages");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"stored");
    }

    #[tokio::test]
    async fn test_concurrent_records_do_not_interleave() {
        let path = temp_log();
        let logger = Arc::new(RequestAuditLogger::open(&path).await.unwrap());

        let tasks: Vec<_> = (0..50)
            .map(|i| {
                let logger = logger.clone();
                tokio::spawn(async move {
                    logger
                        .record(&AuditRecord {
                            timestamp: timestamp(),
                            user: Some(format!("user-{i}")),
                            client_ip: None,
                            method: Method::POST,
                            path: "/messages".to_string(),
                            outcome: Outcome::Status(StatusCode::CREATED),
                        })
                        .await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 50);
        assert!(lines.iter().all(|l| l.starts_with("2024-01-15 10:30:00.123456 - User: user-")
            && l.ends_with(" - Method: POST - Path: /messages - Status: 201")));

        let _ = tokio::fs::remove_file(&path).await;
    }
}
