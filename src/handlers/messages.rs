//! Message handlers behind the request pipeline.
//!
//! # Endpoints
//!
//! - `POST /messages` - Store a message from the caller
//! - `GET /messages` - List stored messages
//!
//! Both run only after the pipeline admitted the request, so they carry no
//! access checks of their own.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::identity::Identity;
use crate::models::{Message, MessageListResponse, SendMessageRequest};
use crate::state::AppState;

/// Store a single message.
///
/// # Request Body
///
/// ```json
/// {
///   "receiver": "bob",
///   "content": "hello"
/// }
/// ```
#[instrument(skip(state, identity, payload))]
pub async fn send_message(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Json(payload): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    payload.validate().map_err(AppError::BadRequest)?;

    let sender = identity
        .map(|Extension(identity)| identity)
        .filter(|identity| identity.is_authenticated)
        .map(|identity| identity.id);

    let message = Message {
        id: Uuid::new_v4(),
        sender,
        receiver: payload.receiver,
        content: payload.content,
        sent_at: Utc::now(),
    };
    info!(id = %message.id, receiver = %message.receiver, "Message stored");
    state.store_message(message.clone()).await;

    Ok((StatusCode::CREATED, Json(message)))
}

/// List all stored messages, oldest first.
#[instrument(skip(state))]
pub async fn list_messages(State(state): State<AppState>) -> Json<MessageListResponse> {
    let messages = state.messages().await;

    Json(MessageListResponse {
        count: messages.len(),
        messages,
    })
}
