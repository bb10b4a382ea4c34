//! Daemon - the main gateway service
//!
//! Wires the model, synthesizer and gateways together, starts the
//! supervised background loops and serves HTTP until shutdown.

use std::sync::Arc;

use crate::api::{ApiServer, ApiState};
use crate::channels::{Channel, TelegramChannel, WhatsAppChannel};
use crate::config::{TelegramConfig, WhatsAppConfig};
use crate::dispatch::DeliveryDispatcher;
use crate::model::ModelProvider;
use crate::retry::RetryPolicy;
use crate::supervisor::{LivenessPinger, RestartPolicy, WebhookReconciler, spawn_supervised};
use crate::synth::ResponseSynthesizer;
use crate::{Config, Error, Result};

/// The Murmur daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until ctrl-c, or until the model turns out to be unavailable
    ///
    /// # Errors
    ///
    /// Returns `Error::ModelUnavailable` when neither model source loads, or
    /// an error if the server cannot start
    pub async fn run(self) -> Result<()> {
        let port = self.config.server.port;
        tracing::info!(port, model = %self.config.model.primary_url, "daemon running");

        let provider = Arc::new(ModelProvider::from_config(&self.config.model)?);
        let synthesizer = Arc::new(ResponseSynthesizer::new(
            Arc::clone(&provider),
            self.config.generation.clone(),
        ));
        let mut state = ApiState::new(synthesizer);
        let mut background = Vec::new();

        // WhatsApp: push through Twilio when recipients are configured
        if let Some(dispatcher) =
            whatsapp_dispatcher(&self.config.whatsapp, &self.config.delivery).await?
        {
            tracing::info!(
                recipients = dispatcher.recipients().len(),
                "WhatsApp replies pushed to recipients"
            );
            state = state.with_whatsapp(Arc::new(dispatcher));
        } else {
            tracing::info!("WhatsApp replies returned inline");
        }

        // Telegram
        if let Some(telegram_config) = &self.config.telegram {
            let telegram = telegram_channel(telegram_config).await;

            if let Some(reconciler) = webhook_reconciler(telegram_config, telegram.clone()) {
                let reconciler = Arc::new(reconciler);
                background.push(spawn_supervised(
                    "webhook-reconciler",
                    RestartPolicy::default(),
                    move || Arc::clone(&reconciler).run(),
                ));
            } else {
                tracing::warn!("TELEGRAM_WEBHOOK_URL not set, webhook reconciliation disabled");
            }

            let dispatcher = DeliveryDispatcher::new(Arc::new(telegram), Vec::new())
                .with_policy(self.config.delivery.clone());
            state = state.with_telegram(Arc::new(dispatcher));
        }

        // Liveness self-ping
        if let Some(interval) = self.config.liveness.interval {
            let pinger = Arc::new(LivenessPinger::with_timing(
                self.config.liveness.url_for(port),
                interval,
                self.config.liveness.timeout,
            )?);
            background.push(spawn_supervised(
                "liveness-pinger",
                RestartPolicy::default(),
                move || Arc::clone(&pinger).run(),
            ));
        }

        // Serve while the model warms up; /health reports initializing until then
        let server = tokio::spawn(ApiServer::new(port, state).run(shutdown_signal()));

        let warm_up = provider.ensure_ready().await;
        let result = match warm_up {
            Ok(handle) => {
                tracing::info!(
                    model = handle.id(),
                    origin = handle.origin().as_str(),
                    "model ready"
                );
                server
                    .await
                    .map_err(|e| Error::Config(format!("API server task failed: {e}")))?
            }
            Err(e) => {
                tracing::error!(error = %e, "no model could be loaded, shutting down");
                server.abort();
                Err(e)
            }
        };

        for task in background {
            task.abort();
        }

        tracing::info!("daemon stopped");
        result
    }
}

/// Build the push dispatcher for WhatsApp, if push delivery is configured
///
/// # Errors
///
/// Returns error if the Twilio configuration is unusable
pub async fn whatsapp_dispatcher(
    config: &WhatsAppConfig,
    delivery: &RetryPolicy,
) -> Result<Option<DeliveryDispatcher>> {
    let Some(credentials) = config.credentials.as_ref().filter(|_| config.push_enabled()) else {
        return Ok(None);
    };

    let mut channel = WhatsAppChannel::new(
        credentials.account_sid.clone(),
        credentials.auth_token.clone(),
        credentials.from_number.clone(),
    )
    .with_api_base(config.api_base.clone());
    channel.connect().await?;

    Ok(Some(
        DeliveryDispatcher::new(Arc::new(channel), config.recipients.clone())
            .with_policy(delivery.clone()),
    ))
}

/// Build and connect the Telegram channel
///
/// Every Bot API call is bounded by the configured call timeout. A failed
/// connect is logged; the channel stays in use so a transient outage at
/// startup does not disable the gateway.
pub async fn telegram_channel(config: &TelegramConfig) -> TelegramChannel {
    let mut telegram = TelegramChannel::new(config.bot_token.clone())
        .with_api_base(config.api_base.clone())
        .with_timeout(config.call_timeout);
    if let Err(e) = telegram.connect().await {
        tracing::error!(error = %e, "Telegram connect failed");
    }
    telegram
}

/// Build the webhook reconciler for Telegram, if a webhook URL is configured
#[must_use]
pub fn webhook_reconciler(
    config: &TelegramConfig,
    telegram: TelegramChannel,
) -> Option<WebhookReconciler> {
    let url = config.webhook_url.as_ref()?;
    Some(
        WebhookReconciler::new(Arc::new(telegram), url.clone())
            .with_interval(config.reconcile_interval)
            .with_call_timeout(config.call_timeout)
            .with_retry_policy(config.call_retry.clone()),
    )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
