use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum accepted message content length, in characters.
pub const MAX_CONTENT_LENGTH: usize = 10_000;

/// Request to send a message.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Recipient user id
    pub receiver: String,
    /// Message text
    pub content: String,
}

impl SendMessageRequest {
    /// Check the request for empty or oversized fields.
    ///
    /// Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.receiver.trim().is_empty() {
            return Err("receiver must not be empty".to_string());
        }
        if self.content.trim().is_empty() {
            return Err("content must not be empty".to_string());
        }
        let len = self.content.chars().count();
        if len > MAX_CONTENT_LENGTH {
            return Err(format!(
                "content is {len} characters, maximum is {MAX_CONTENT_LENGTH}"
            ));
        }
        Ok(())
    }
}

/// A stored message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    /// Sender user id, `None` for anonymous callers
    pub sender: Option<String>,
    pub receiver: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// Response listing stored messages.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageListResponse {
    pub messages: Vec<Message>,
    pub count: usize,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status: "healthy"
    pub status: String,
    /// Application version
    pub version: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
}

/// Service statistics response.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    /// Client keys currently held by the rate limiter
    pub tracked_keys: usize,
    /// Messages held in the store
    pub stored_messages: usize,
    /// Whether rate limiting is active
    pub rate_limiting_enabled: bool,
    /// Service uptime in seconds
    pub uptime_seconds: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn request(receiver: &str, content: &str) -> SendMessageRequest {
        SendMessageRequest {
            receiver: receiver.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_validate_accepts_normal_message() {
        assert!(request("bob", "hello").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        assert!(request("  ", "hello").validate().unwrap_err().contains("receiver"));
        assert!(request("bob", "\n").validate().unwrap_err().contains("content"));
    }

    #[test]
    fn test_validate_rejects_oversized_content() {
        let content = "x".repeat(MAX_CONTENT_LENGTH + 1);
        assert!(request("bob", &content).validate().is_err());

        let content = "é".repeat(MAX_CONTENT_LENGTH);
        assert!(request("bob", &content).validate().is_ok());
    }

    #[test]
    fn test_send_request_deserializes() {
        let req: SendMessageRequest =
            serde_json::from_str(r#"{"receiver":"bob","content":"hi"}"#).unwrap();
        assert_eq!(req.receiver, "bob");
        assert_eq!(req.content, "hi");
    }
}
