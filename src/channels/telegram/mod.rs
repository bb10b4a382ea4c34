//! Telegram channel adapter
//!
//! Uses webhooks for receiving messages and the Bot API for sending and for
//! managing the webhook registration.

mod api;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::SecretString;

use super::{Channel, OutgoingMessage};
use crate::supervisor::WebhookRegistry;
use crate::{Error, Result};

pub use types::{BotUser, WebhookInfo};

/// Upper bound on a single Bot API call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Telegram channel adapter
#[derive(Clone)]
pub struct TelegramChannel {
    token: SecretString,
    api_base: String,
    client: Client,
    timeout: Duration,
}

impl TelegramChannel {
    /// Create a new Telegram channel adapter
    #[must_use]
    pub fn new(token: SecretString) -> Self {
        Self {
            token,
            api_base: types::API_BASE.to_string(),
            client: Client::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Point the adapter at a different Bot API host
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Bound every Bot API call by `timeout`
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn connect(&mut self) -> Result<()> {
        let me = self.get_me().await?;
        tracing::info!(username = ?me.username, "Telegram channel connected");
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        let chat_id: i64 = message
            .channel_id
            .parse()
            .map_err(|_| Error::Channel("Invalid chat ID".to_string()))?;

        self.send_message(chat_id, &message.content).await
    }
}

#[async_trait]
impl WebhookRegistry for TelegramChannel {
    fn gateway(&self) -> &'static str {
        "telegram"
    }

    async fn current_webhook(&self) -> Result<Option<String>> {
        let info = self.get_webhook_info().await?;
        if let Some(error) = &info.last_error_message {
            tracing::debug!(
                error = %error,
                pending = info.pending_update_count,
                "Telegram reports webhook delivery errors"
            );
        }
        Ok(Some(info.url).filter(|url| !url.is_empty()))
    }

    async fn register_webhook(&self, url: &str) -> Result<()> {
        self.set_webhook(url).await
    }
}
