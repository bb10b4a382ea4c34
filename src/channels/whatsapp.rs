//! `WhatsApp` channel adapter
//!
//! Uses the Twilio Messages API for pushed replies. Twilio delivers inbound
//! messages as form-encoded webhooks and accepts a TwiML document as the
//! synchronous response.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{Channel, OutgoingMessage};
use crate::{Error, Result};

/// Twilio REST API base URL
pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Upper bound on a single Messages API call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `WhatsApp` channel adapter
pub struct WhatsAppChannel {
    /// Twilio account SID (also the basic-auth user)
    account_sid: String,
    /// Twilio auth token
    auth_token: SecretString,
    /// Twilio `WhatsApp` sender number
    from_number: String,
    api_base: String,
    client: Client,
    timeout: Duration,
}

impl WhatsAppChannel {
    /// Create a new `WhatsApp` channel adapter
    ///
    /// # Arguments
    ///
    /// * `account_sid` - Twilio account SID
    /// * `auth_token` - Twilio auth token
    /// * `from_number` - `WhatsApp`-enabled Twilio number
    #[must_use]
    pub fn new(account_sid: String, auth_token: SecretString, from_number: String) -> Self {
        Self {
            account_sid,
            auth_token,
            from_number,
            api_base: TWILIO_API_BASE.to_string(),
            client: Client::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Point the adapter at a different API host
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Bound every Messages API call by `timeout`
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a text message to a `WhatsApp` number
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        );

        let form = vec![
            ("From", whatsapp_address(&self.from_number)),
            ("To", whatsapp_address(to)),
            ("Body", text.to_string()),
        ];

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Twilio API error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!("Twilio API error: {status} - {body}")));
        }

        tracing::debug!(to, "WhatsApp message sent");
        Ok(())
    }
}

#[async_trait]
impl Channel for WhatsAppChannel {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    async fn connect(&mut self) -> Result<()> {
        // Twilio pushes to us; "connect" only validates the configuration
        if self.account_sid.is_empty() {
            return Err(Error::Channel("Twilio account SID required".to_string()));
        }
        if self.auth_token.expose_secret().is_empty() {
            return Err(Error::Channel("Twilio auth token required".to_string()));
        }
        if self.from_number.is_empty() {
            return Err(Error::Channel("Twilio WhatsApp number required".to_string()));
        }

        tracing::info!("WhatsApp channel connected");
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        self.send_text(&message.channel_id, &message.content).await
    }
}

/// Form fields of a Twilio inbound message webhook
#[derive(Debug, Default, Deserialize)]
pub struct TwilioInbound {
    /// Sender address, e.g. `whatsapp:+15551234567`
    #[serde(rename = "From", default)]
    pub from: String,
    /// Message text
    #[serde(rename = "Body", default)]
    pub body: String,
    /// Twilio message SID
    #[serde(rename = "MessageSid", default)]
    pub message_sid: Option<String>,
}

/// Build a TwiML response, optionally carrying one reply message
#[must_use]
pub fn twiml_reply(text: Option<&str>) -> String {
    match text {
        Some(text) => format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
            escape_xml(text)
        ),
        None => "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>".to_string(),
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Prefix a phone number with the `whatsapp:` scheme unless it has one
fn whatsapp_address(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{number}")
    }
}
