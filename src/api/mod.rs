//! HTTP API server for the Murmur gateway

pub mod health;
pub mod webhooks;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::dispatch::DeliveryDispatcher;
use crate::model::ModelProvider;
use crate::synth::ResponseSynthesizer;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub provider: Arc<ModelProvider>,
    pub synthesizer: Arc<ResponseSynthesizer>,
    /// Push dispatcher for WhatsApp; `None` means replies are returned inline
    pub whatsapp: Option<Arc<DeliveryDispatcher>>,
    /// Dispatcher for Telegram; `None` when no bot token is configured
    pub telegram: Option<Arc<DeliveryDispatcher>>,
}

impl ApiState {
    /// State with inline WhatsApp replies and no Telegram
    #[must_use]
    pub fn new(synthesizer: Arc<ResponseSynthesizer>) -> Self {
        Self {
            provider: Arc::clone(synthesizer.provider()),
            synthesizer,
            whatsapp: None,
            telegram: None,
        }
    }

    /// Push WhatsApp replies through `dispatcher`
    #[must_use]
    pub fn with_whatsapp(mut self, dispatcher: Arc<DeliveryDispatcher>) -> Self {
        self.whatsapp = Some(dispatcher);
        self
    }

    /// Send Telegram replies through `dispatcher`
    #[must_use]
    pub fn with_telegram(mut self, dispatcher: Arc<DeliveryDispatcher>) -> Self {
        self.telegram = Some(dispatcher);
        self
    }
}

/// Build the router with all routes
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .merge(health::router(state.clone()))
        .merge(webhooks::router(state))
        .layer(TraceLayer::new_for_http())
}

/// API server
pub struct ApiServer {
    port: u16,
    state: Arc<ApiState>,
}

impl ApiServer {
    #[must_use]
    pub fn new(port: u16, state: ApiState) -> Self {
        Self {
            port,
            state: Arc::new(state),
        }
    }

    /// Run the API server until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run<S>(self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}
