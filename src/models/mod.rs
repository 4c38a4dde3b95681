mod api;

pub use api::{HealthResponse, Message, MessageListResponse, SendMessageRequest, StatsResponse};
