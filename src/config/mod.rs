//! Configuration management for the Murmur gateway
//!
//! Every setting resolves env > TOML file > default.

pub mod file;

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;

use crate::channels::telegram::types::API_BASE as TELEGRAM_API_BASE;
use crate::channels::whatsapp::TWILIO_API_BASE;
use crate::retry::RetryPolicy;
use crate::synth::GenerationConfig;
use crate::{Error, Result};

use file::MurmurConfigFile;

/// Murmur gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Inference server configuration
    pub model: ModelConfig,

    /// Reply sampling parameters
    pub generation: GenerationConfig,

    /// Twilio WhatsApp gateway
    pub whatsapp: WhatsAppConfig,

    /// Telegram gateway, present only when a bot token is configured
    pub telegram: Option<TelegramConfig>,

    /// Outbound delivery retries
    pub delivery: RetryPolicy,

    /// Liveness self-ping
    pub liveness: LivenessConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
}

/// Inference server configuration
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Primary text-generation-inference server
    pub primary_url: String,

    /// Smaller server tried when the primary fails to load
    pub fallback_url: Option<String>,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Retry policy applied to each source load
    pub load_retry: RetryPolicy,
}

/// Twilio account credentials
#[derive(Debug, Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: SecretString,

    /// Sender number, without the `whatsapp:` prefix
    pub from_number: String,
}

/// WhatsApp gateway configuration
///
/// Without recipients the gateway is synchronous: replies go back in the
/// webhook response and no credentials are needed.
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub credentials: Option<TwilioCredentials>,
    pub recipients: Vec<String>,
    pub api_base: String,
}

impl WhatsAppConfig {
    /// Whether replies are pushed through the Messages API
    #[must_use]
    pub fn push_enabled(&self) -> bool {
        self.credentials.is_some() && !self.recipients.is_empty()
    }
}

/// Telegram gateway configuration
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,

    /// Public webhook URL; reconciliation is disabled without it
    pub webhook_url: Option<String>,

    pub api_base: String,

    /// Time between reconciliation passes
    pub reconcile_interval: Duration,

    /// Bound on each Bot API call
    pub call_timeout: Duration,

    /// Retry policy for each Bot API call made by the reconciler
    pub call_retry: RetryPolicy,
}

/// Liveness self-ping configuration
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// Probe target; defaults to the local `/health` endpoint
    pub url: Option<String>,

    /// Time between probes; `None` disables the pinger
    pub interval: Option<Duration>,

    /// Per-probe timeout
    pub timeout: Duration,
}

impl LivenessConfig {
    /// Probe target for a server listening on `port`
    #[must_use]
    pub fn url_for(&self, port: u16) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{port}/health"))
    }
}

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MODEL_URL: &str = "http://127.0.0.1:8080";

impl Config {
    /// Load configuration from the environment and the TOML file at
    /// `config_path` (or the standard path)
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is inconsistent
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path);
        Self::from_sources(|key| std::env::var(key).ok(), fc)
    }

    /// Build configuration from an environment lookup and a parsed file
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is inconsistent
    pub fn from_sources<F>(env: F, fc: MurmurConfigFile) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_parse = |key: &str| env(key).and_then(|s| s.trim().parse::<u64>().ok());

        // Server (env > toml > default)
        let port = env("MURMUR_PORT")
            .or_else(|| env("PORT"))
            .and_then(|s| s.trim().parse().ok())
            .or(fc.server.port)
            .unwrap_or(DEFAULT_PORT);

        // Model
        let model = ModelConfig {
            primary_url: env("MODEL_URL")
                .or(fc.model.url)
                .unwrap_or_else(|| DEFAULT_MODEL_URL.to_string()),
            fallback_url: env("MODEL_FALLBACK_URL")
                .or(fc.model.fallback_url)
                .filter(|url| !url.trim().is_empty()),
            request_timeout: Duration::from_secs(
                env_parse("MODEL_TIMEOUT_SECS")
                    .or(fc.model.timeout_secs)
                    .unwrap_or(60),
            ),
            load_retry: RetryPolicy::exponential(
                fc.model.load_attempts.unwrap_or(1),
                Duration::from_secs(1),
                Duration::from_secs(30),
            ),
        };

        // Generation
        let defaults = GenerationConfig::default();
        let generation = GenerationConfig {
            max_retries: env("GENERATION_MAX_RETRIES")
                .and_then(|s| s.trim().parse().ok())
                .or(fc.generation.max_retries)
                .unwrap_or(defaults.max_retries),
            max_reply_chars: fc
                .generation
                .max_reply_chars
                .unwrap_or(defaults.max_reply_chars),
            top_k: fc.generation.top_k.unwrap_or(defaults.top_k),
            top_p: fc.generation.top_p.unwrap_or(defaults.top_p),
            repetition_penalty: fc
                .generation
                .repetition_penalty
                .unwrap_or(defaults.repetition_penalty),
            styles: defaults.styles,
        };
        generation.validate()?;

        // WhatsApp
        let account_sid = env("TWILIO_ACCOUNT_SID").or(fc.whatsapp.account_sid);
        let auth_token = env("TWILIO_AUTH_TOKEN").or(fc.whatsapp.auth_token);
        let from_number = env("TWILIO_WHATSAPP_NUMBER").or(fc.whatsapp.number);
        let credentials = match (account_sid, auth_token, from_number) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioCredentials {
                account_sid,
                auth_token: SecretString::from(auth_token),
                from_number: strip_whatsapp_prefix(&from_number),
            }),
            _ => None,
        };

        let recipients = env("WHATSAPP_RECIPIENTS")
            .or_else(|| env("YOUR_PHONE_NUMBER"))
            .map(|s| split_list(&s))
            .or(fc.whatsapp.recipients)
            .unwrap_or_default()
            .iter()
            .map(|r| strip_whatsapp_prefix(r))
            .filter(|r| !r.is_empty())
            .collect::<Vec<_>>();

        if !recipients.is_empty() && credentials.is_none() {
            return Err(Error::Config(
                "WhatsApp recipients are set but Twilio credentials are incomplete \
                 (need TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_WHATSAPP_NUMBER)"
                    .to_string(),
            ));
        }

        let whatsapp = WhatsAppConfig {
            credentials,
            recipients,
            api_base: fc
                .whatsapp
                .api_base
                .unwrap_or_else(|| TWILIO_API_BASE.to_string()),
        };

        // Telegram
        let webhook_url = env("TELEGRAM_WEBHOOK_URL").or(fc.telegram.webhook_url);
        if let Some(url) = &webhook_url {
            url::Url::parse(url)
                .map_err(|e| Error::Config(format!("invalid TELEGRAM_WEBHOOK_URL {url}: {e}")))?;
        }
        let reconcile_secs = env_parse("WEBHOOK_RECONCILE_INTERVAL_SECS")
            .or(fc.telegram.reconcile_interval_secs)
            .unwrap_or(15 * 60)
            .max(1);

        let telegram = env("TELEGRAM_BOT_TOKEN")
            .or(fc.telegram.bot_token)
            .filter(|token| !token.trim().is_empty())
            .map(|token| TelegramConfig {
                bot_token: SecretString::from(token),
                webhook_url,
                api_base: fc
                    .telegram
                    .api_base
                    .unwrap_or_else(|| TELEGRAM_API_BASE.to_string()),
                reconcile_interval: Duration::from_secs(reconcile_secs),
                call_timeout: Duration::from_secs(10),
                call_retry: RetryPolicy::fixed(3, Duration::from_secs(2)),
            });

        // Delivery
        let delivery = RetryPolicy::fixed(
            fc.delivery.attempts.unwrap_or(2),
            Duration::from_millis(fc.delivery.retry_delay_ms.unwrap_or(500)),
        );

        // Liveness (0 disables)
        let liveness_secs = env_parse("LIVENESS_INTERVAL_SECS")
            .or(fc.server.liveness_interval_secs)
            .unwrap_or(20);
        let liveness = LivenessConfig {
            url: env("LIVENESS_URL").or(fc.server.liveness_url),
            interval: (liveness_secs > 0).then_some(Duration::from_secs(liveness_secs)),
            timeout: Duration::from_secs(5),
        };

        Ok(Self {
            server: ServerConfig { port },
            model,
            generation,
            whatsapp,
            telegram,
            delivery,
            liveness,
        })
    }
}

/// Split a comma separated list, dropping blanks
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn strip_whatsapp_prefix(number: &str) -> String {
    let number = number.trim();
    number
        .strip_prefix("whatsapp:")
        .unwrap_or(number)
        .trim()
        .to_string()
}
