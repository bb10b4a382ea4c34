//! Raw Telegram Bot API calls

use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::types::{BotUser, SendMessageRequest, SetWebhookRequest, TelegramResponse, WebhookInfo};
use crate::{Error, Result};

impl super::TelegramChannel {
    pub(crate) fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token.expose_secret())
    }

    /// Call a Bot API method and unwrap its `result`
    async fn call<B, T>(&self, method: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self
            .client
            .post(self.method_url(method))
            .timeout(self.timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram {method} error: {}", e.without_url())))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Channel(format!("Telegram response read error: {e}")))?;

        let parsed: TelegramResponse<T> = serde_json::from_str(&text).map_err(|e| {
            Error::Channel(format!("Telegram {method} error: {status} - unparseable response: {e}"))
        })?;

        match parsed.result {
            Some(result) if parsed.ok => Ok(result),
            _ => Err(Error::Channel(format!(
                "Telegram {method} error: {status} - {}",
                parsed.description.unwrap_or_default()
            ))),
        }
    }

    /// Send a plain-text message to a chat
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let request = SendMessageRequest { chat_id, text };
        self.call::<_, serde_json::Value>("sendMessage", Some(&request))
            .await?;

        tracing::debug!(chat_id, "Telegram message sent");
        Ok(())
    }

    /// Fetch the bot's own identity (validates the token)
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn get_me(&self) -> Result<BotUser> {
        self.call::<(), _>("getMe", None).await
    }

    /// Fetch the currently registered webhook
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn get_webhook_info(&self) -> Result<WebhookInfo> {
        self.call::<(), _>("getWebhookInfo", None).await
    }

    /// Set webhook URL for receiving updates
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn set_webhook(&self, url: &str) -> Result<()> {
        let request = SetWebhookRequest {
            url,
            allowed_updates: Some(vec!["message"]),
        };
        self.call::<_, bool>("setWebhook", Some(&request)).await?;

        tracing::info!(url, "Telegram webhook set");
        Ok(())
    }
}
