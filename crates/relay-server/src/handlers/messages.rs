//! Message history and HTTP send/read
//!
//! Same pipeline as the WebSocket path, so live connections still get
//! `receive_message`, `message_sent` and `read_receipt` events.

use crate::chat::ReadOutcome;
use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::Result;
use crate::models::{Message, SendMessageInput, UserId};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResponse {
    pub message_id: String,
    pub already_read: bool,
    pub receipt_delivered: bool,
}

/// GET /api/messages/:user_id
pub async fn get_conversation(
    ctx: Ctx,
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Message>>> {
    info!("GET /api/messages/{} by {}", user_id, ctx.user_id());

    let messages = state
        .hub
        .pipeline()
        .conversation(ctx.user_id(), &UserId::new(user_id))
        .await?;
    Ok(Json(messages))
}

/// POST /api/messages
pub async fn post_message(
    ctx: Ctx,
    State(state): State<AppState>,
    Json(input): Json<SendMessageInput>,
) -> Result<(StatusCode, Json<Message>)> {
    info!("POST /api/messages - {} -> {}", ctx.user_id(), input.receiver_id);

    let outcome = state
        .hub
        .send_message(ctx.user_id(), &input.receiver_id, &input.content)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome.message)))
}

/// PUT /api/messages/:message_id/read
pub async fn mark_read(
    ctx: Ctx,
    Path(message_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ReadResponse>> {
    info!("PUT /api/messages/{}/read by {}", message_id, ctx.user_id());

    let response = match state.hub.mark_read(&message_id, ctx.user_id()).await? {
        ReadOutcome::Marked { receipt } => ReadResponse {
            message_id,
            already_read: false,
            receipt_delivered: receipt.is_delivered(),
        },
        ReadOutcome::AlreadyRead => ReadResponse {
            message_id,
            already_read: true,
            receipt_delivered: false,
        },
    };
    Ok(Json(response))
}
