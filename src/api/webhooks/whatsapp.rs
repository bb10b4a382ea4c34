//! Twilio WhatsApp webhook handler
//!
//! Twilio posts inbound messages as a form and accepts a TwiML document in
//! response. Without push recipients the reply travels back in that
//! document; with recipients it is pushed through the Messages API and the
//! TwiML is left empty.

use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::api::ApiState;
use crate::channels::{TwilioInbound, twiml_reply};
use crate::dispatch::{Destination, ReplyMessage};

/// Handle an inbound Twilio WhatsApp message
pub async fn handle_message(
    State(state): State<Arc<ApiState>>,
    Form(inbound): Form<TwilioInbound>,
) -> Response {
    let prompt = inbound.body.trim();
    if prompt.is_empty() {
        tracing::debug!(from = %inbound.from, "empty WhatsApp message, nothing to answer");
        return twiml(None);
    }

    tracing::info!(
        from = %inbound.from,
        sid = ?inbound.message_sid,
        "received WhatsApp message"
    );

    if let Some(dispatcher) = &state.whatsapp {
        let synthesizer = Arc::clone(&state.synthesizer);
        let prompt = prompt.to_string();
        dispatcher.spawn_send(async move {
            let text = synthesizer.generate(&prompt).await;
            ReplyMessage::new(text, Destination::Recipients)
        });
        return twiml(None);
    }

    let reply = state.synthesizer.generate(prompt).await;
    twiml(Some(&reply))
}

fn twiml(text: Option<&str>) -> Response {
    (
        [(header::CONTENT_TYPE, "application/xml")],
        twiml_reply(text),
    )
        .into_response()
}
