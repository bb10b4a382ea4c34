//! Telegram webhook handler

pub mod types;

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use self::types::TelegramUpdate;
use crate::api::ApiState;
use crate::dispatch::{Destination, ReplyMessage};

/// Telegram webhook response
#[derive(Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
}

/// Handle incoming Telegram update
///
/// Returns 200 immediately and generates the reply in a background task.
/// Telegram requires fast webhook responses to avoid retries.
#[allow(clippy::unused_async)]
pub async fn handle_update(
    State(state): State<Arc<ApiState>>,
    Json(update): Json<TelegramUpdate>,
) -> (StatusCode, Json<WebhookResponse>) {
    let ack = (StatusCode::OK, Json(WebhookResponse { ok: true }));

    let Some(dispatcher) = state.telegram.clone() else {
        tracing::warn!("Telegram update received but no bot token is configured");
        return ack;
    };

    let Some(message) = update.message else {
        tracing::debug!(update_id = ?update.update_id, "ignoring update without message");
        return ack;
    };

    if message.from.as_ref().is_some_and(|user| user.is_bot) {
        tracing::debug!(chat_id = message.chat.id, "ignoring message from bot");
        return ack;
    }

    let Some(text) = message.text.filter(|t| !t.trim().is_empty()) else {
        tracing::debug!(chat_id = message.chat.id, "ignoring message without text");
        return ack;
    };

    let chat_id = message.chat.id;
    tracing::info!(
        chat_id,
        update_id = ?update.update_id,
        message_id = ?message.message_id,
        "received Telegram message"
    );

    let synthesizer = Arc::clone(&state.synthesizer);
    dispatcher.spawn_send(async move {
        let reply = synthesizer.generate(text.trim()).await;
        ReplyMessage::new(reply, Destination::Chat(chat_id.to_string()))
    });

    ack
}
