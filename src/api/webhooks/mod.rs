//! Webhook endpoints for the messaging gateways

use std::sync::Arc;

use axum::{Router, routing::post};

use super::ApiState;

pub mod telegram;
pub mod whatsapp;

/// Build webhooks router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/whatsapp", post(whatsapp::handle_message))
        .route("/telegram", post(telegram::handle_update))
        .with_state(state)
}
