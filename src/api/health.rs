//! Health check endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use super::ApiState;
use crate::model::ModelState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelStatus>,
}

/// Loaded model details
#[derive(Serialize)]
pub struct ModelStatus {
    pub id: String,
    pub origin: &'static str,
}

/// Liveness probe
///
/// Reports `alive` only once a model is loaded; before that, and after a
/// terminal load failure, answers 503 so load balancers hold traffic.
async fn health(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status) = match state.provider.state() {
        ModelState::Ready | ModelState::FallbackReady => (StatusCode::OK, "alive"),
        ModelState::Failed => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        ModelState::Unloaded | ModelState::Loading => {
            (StatusCode::SERVICE_UNAVAILABLE, "initializing")
        }
    };

    let model = state.provider.handle().map(|handle| ModelStatus {
        id: handle.id().to_string(),
        origin: handle.origin().as_str(),
    });

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            model,
        }),
    )
}

async fn index() -> &'static str {
    "murmur is running"
}

/// Build health router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .with_state(state)
}
