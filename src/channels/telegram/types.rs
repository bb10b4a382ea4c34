//! Telegram Bot API request/response types

use serde::{Deserialize, Serialize};

/// Telegram Bot API host
pub const API_BASE: &str = "https://api.telegram.org";

/// Telegram sendMessage request
#[derive(Debug, Serialize)]
pub(crate) struct SendMessageRequest<'a> {
    pub chat_id: i64,
    pub text: &'a str,
}

/// Telegram setWebhook request
#[derive(Debug, Serialize)]
pub(crate) struct SetWebhookRequest<'a> {
    pub url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_updates: Option<Vec<&'static str>>,
}

/// Telegram API response envelope
#[derive(Debug, Deserialize)]
pub struct TelegramResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

/// Result of `getWebhookInfo`
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookInfo {
    /// Registered webhook URL; empty when none is set
    #[serde(default)]
    pub url: String,
    /// Updates waiting to be delivered
    #[serde(default)]
    pub pending_update_count: i64,
    /// Most recent delivery error reported by Telegram
    pub last_error_message: Option<String>,
}

/// Result of `getMe`
#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_empty_webhook_info() {
        let body = r#"{"ok":true,"result":{"url":"","has_custom_certificate":false,"pending_update_count":0}}"#;
        let parsed: TelegramResponse<WebhookInfo> = serde_json::from_str(body).unwrap();
        assert!(parsed.ok);
        assert_eq!(parsed.result.unwrap().url, "");
    }

    #[test]
    fn parses_error_envelope() {
        let body = r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#;
        let parsed: TelegramResponse<WebhookInfo> = serde_json::from_str(body).unwrap();
        assert!(!parsed.ok);
        assert!(parsed.result.is_none());
        assert_eq!(parsed.description.as_deref(), Some("Unauthorized"));
    }

    #[test]
    fn set_webhook_omits_missing_updates() {
        let request = SetWebhookRequest {
            url: "https://bot.example/telegram",
            allowed_updates: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("allowed_updates").is_none());
    }
}
