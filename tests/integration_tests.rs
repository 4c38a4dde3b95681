//! End-to-end tests against a real server bound to an ephemeral port.
//!
//! The server is assembled exactly like `main` does, except that the clock is
//! a `ManualClock` pinned to a chosen local time so the access-hours gate is
//! deterministic.
//!
//! Run with: `cargo test --test integration_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tokio::time::sleep;
use uuid::Uuid;

use messaging_gate::clock::ManualClock;
use messaging_gate::middleware::RequestAuditLogger;
use messaging_gate::{AppState, Config, build_router};

/// Find an available port for the test server
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to ephemeral port")
        .local_addr()
        .expect("Failed to get local address")
        .port()
}

/// Test fixture that runs the app server in the background
struct TestFixture {
    base_url: String,
    client: Client,
    log_path: PathBuf,
    state: AppState,
}

impl TestFixture {
    /// Start a server whose clock reads `hour:00` local time.
    async fn at_hour(hour: u32) -> Self {
        Self::with_config(hour, Config::default()).await
    }

    async fn with_config(hour: u32, config: Config) -> Self {
        let port = find_available_port();
        let base_url = format!("http://127.0.0.1:{port}");
        let log_path = std::env::temp_dir().join(format!("requests-{}.log", Uuid::new_v4()));

        let config = Config {
            host: "127.0.0.1".to_string(),
            port,
            audit_log_path: log_path.clone(),
            metrics_port: 0,
            log_level: "warn".to_string(),
            ..config
        };

        let clock = Arc::new(ManualClock::new(
            NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
        ));
        let audit = RequestAuditLogger::open(&config.audit_log_path)
            .await
            .expect("Failed to open audit log");
        let state = AppState::new(config, audit, clock).expect("Failed to build state");
        let app = build_router(state.clone()).expect("Failed to build router");

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .expect("Failed to bind server");
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Server failed");
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        let fixture = Self {
            base_url,
            client,
            log_path,
            state,
        };
        fixture.wait_for_server().await;
        fixture
    }

    /// Wait for the server to accept connections.
    ///
    /// Any response counts: outside access hours `/health` is refused too.
    async fn wait_for_server(&self) {
        for _ in 0..50 {
            if self.client.get(self.url("/health")).send().await.is_ok() {
                return;
            }
            sleep(Duration::from_millis(100)).await;
        }
        panic!("Server failed to respond");
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_from(&self, ip: &str, content: &str) -> reqwest::Response {
        self.client
            .post(self.url("/messages"))
            .header("x-forwarded-for", ip)
            .json(&json!({ "receiver": "bob", "content": content }))
            .send()
            .await
            .expect("Request failed")
    }

    async fn audit_lines(&self) -> Vec<String> {
        tokio::fs::read_to_string(&self.log_path)
            .await
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Drop for TestFixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.log_path);
    }
}

// ============================================================================
// Health & Status Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::at_hour(12).await;

    let response = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_stats_endpoint() {
    let fixture = TestFixture::at_hour(12).await;

    fixture.send_from("1.2.3.4", "hello").await;

    let body: Value = fixture
        .client
        .get(fixture.url("/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["tracked_keys"], 1);
    assert_eq!(body["stored_messages"], 1);
    assert_eq!(body["rate_limiting_enabled"], true);
}

// ============================================================================
// Message Tests
// ============================================================================

#[tokio::test]
async fn test_send_and_list_messages() {
    let fixture = TestFixture::at_hour(12).await;

    let response = fixture
        .client
        .post(fixture.url("/messages"))
        .header("x-user-id", "alice")
        .header("x-user-role", "admin")
        .json(&json!({ "receiver": "bob", "content": "hello bob" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let sent: Value = response.json().await.unwrap();
    assert_eq!(sent["sender"], "alice");

    let listed: Value = fixture
        .client
        .get(fixture.url("/messages"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["messages"][0]["content"], "hello bob");
    assert_eq!(listed["messages"][0]["id"], sent["id"]);
}

#[tokio::test]
async fn test_send_message_validation() {
    let fixture = TestFixture::at_hour(12).await;

    let response = fixture.send_from("1.2.3.4", "   ").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "bad_request");
}

// ============================================================================
// Gate Tests
// ============================================================================

#[tokio::test]
async fn test_rate_limit_per_client() {
    let fixture = TestFixture::at_hour(12).await;

    for i in 0..5 {
        let response = fixture.send_from("1.2.3.4", &format!("msg {i}")).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = fixture.send_from("1.2.3.4", "one too many").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response.headers()["x-ratelimit-limit"], "5");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    assert!(response.headers().contains_key("retry-after"));
    assert_eq!(
        response.text().await.unwrap(),
        "You have exceeded the limit of 5 messages per minute. Please wait before sending more."
    );

    let response = fixture.send_from("5.6.7.8", "different client").await;
    assert_eq!(response.status(), StatusCode::CREATED);

    assert_eq!(fixture.state.message_count().await, 6);
}

#[tokio::test]
async fn test_peer_address_used_without_forwarded_header() {
    let fixture = TestFixture::at_hour(12).await;

    for _ in 0..5 {
        let response = fixture
            .client
            .post(fixture.url("/messages"))
            .json(&json!({ "receiver": "bob", "content": "hi" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = fixture
        .client
        .post(fixture.url("/messages"))
        .json(&json!({ "receiver": "bob", "content": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let lines = fixture.audit_lines().await;
    assert!(
        lines
            .iter()
            .any(|l| l.contains("- IP: 127.0.0.1 -") && l.ends_with("403 (Rate limit exceeded)"))
    );
}

#[tokio::test]
async fn test_rate_limit_disabled() {
    let config = Config {
        rate_limit_count: 0,
        ..Config::default()
    };
    let fixture = TestFixture::with_config(12, config).await;

    for _ in 0..8 {
        let response = fixture.send_from("1.2.3.4", "unlimited").await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}

#[tokio::test]
async fn test_outside_hours_refused() {
    let fixture = TestFixture::at_hour(22).await;

    let response = fixture
        .client
        .get(fixture.url("/messages"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        response.headers()["content-type"],
        "text/plain; charset=utf-8"
    );
    assert_eq!(
        response.text().await.unwrap(),
        "Access to the messaging app is restricted between 9 PM and 6 AM."
    );
}

#[tokio::test]
async fn test_role_restriction() {
    let fixture = TestFixture::at_hour(12).await;

    let response = fixture
        .client
        .post(fixture.url("/messages"))
        .header("x-user-id", "eve")
        .header("x-user-role", "member")
        .json(&json!({ "receiver": "bob", "content": "hi" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        response.text().await.unwrap(),
        "You do not have permission to perform this action."
    );
    assert_eq!(fixture.state.message_count().await, 0);
}

// ============================================================================
// Audit Log Tests
// ============================================================================

#[tokio::test]
async fn test_audit_log_records_each_request() {
    let fixture = TestFixture::at_hour(12).await;
    let before = fixture.audit_lines().await.len();

    fixture
        .client
        .post(fixture.url("/messages"))
        .header("x-user-id", "alice")
        .header("x-user-role", "moderator")
        .json(&json!({ "receiver": "bob", "content": "hi" }))
        .send()
        .await
        .unwrap();
    fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();

    let lines = fixture.audit_lines().await;
    assert_eq!(lines.len(), before + 2);
    assert!(lines[before].starts_with("2024-01-15 12:00:00.000000 - User: alice"));
    assert!(lines[before].ends_with("- Method: POST - Path: /messages - Status: 201"));
    assert!(
        lines[before + 1].ends_with("- User: Anonymous - Method: GET - Path: /health - Status: 200")
    );
}
