//! Chat endpoints.
//!
//! - `POST /api/chat` runs the chat pipeline and returns the reply
//! - `GET /api/conversation/:id` returns a stored conversation

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{bearer_token, ApiContext};
use crate::pipeline::chat::{ChatReply, ChatRequest, Conversation};

/// Longest accepted user message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// `POST /api/chat`
pub async fn send(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Json(mut req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("Message content cannot be empty".into()));
    }
    if req.content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Message too long (max {MAX_MESSAGE_CHARS} characters)"
        )));
    }
    req.auth_token = bearer_token(&headers);

    let reply = ctx
        .run_blocking(move |core| core.chat_pipeline().respond(&req))
        .await??;
    Ok(Json(reply))
}

/// `GET /api/conversation/:id`
pub async fn conversation(
    State(ctx): State<ApiContext>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    let lookup = conversation_id.clone();
    let found = ctx
        .run_blocking(move |core| core.conversations().get(&lookup))
        .await??;
    found
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Conversation not found: {conversation_id}")))
}
