//! TOML configuration file loading
//!
//! Supports `~/.config/murmur/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct MurmurConfigFile {
    #[serde(default)]
    pub server: ServerFileConfig,

    #[serde(default)]
    pub model: ModelFileConfig,

    #[serde(default)]
    pub generation: GenerationFileConfig,

    #[serde(default)]
    pub whatsapp: WhatsAppFileConfig,

    #[serde(default)]
    pub telegram: TelegramFileConfig,

    #[serde(default)]
    pub delivery: DeliveryFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// HTTP port
    pub port: Option<u16>,

    /// URL probed by the liveness pinger
    pub liveness_url: Option<String>,

    /// Seconds between liveness pings (0 disables)
    pub liveness_interval_secs: Option<u64>,
}

/// Inference server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ModelFileConfig {
    /// Primary text-generation-inference server
    pub url: Option<String>,

    /// Smaller server used when the primary cannot be loaded
    pub fallback_url: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Load attempts per source
    pub load_attempts: Option<u32>,
}

/// Sampling configuration
#[derive(Debug, Default, Deserialize)]
pub struct GenerationFileConfig {
    pub max_retries: Option<u32>,
    pub max_reply_chars: Option<usize>,
    pub top_k: Option<u32>,
    pub top_p: Option<f32>,
    pub repetition_penalty: Option<f32>,
}

/// Twilio WhatsApp configuration
#[derive(Debug, Default, Deserialize)]
pub struct WhatsAppFileConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,

    /// Twilio sender number, without the `whatsapp:` prefix
    pub number: Option<String>,

    /// Push recipients; empty means replies are returned inline
    pub recipients: Option<Vec<String>>,

    pub api_base: Option<String>,
}

/// Telegram Bot API configuration
#[derive(Debug, Default, Deserialize)]
pub struct TelegramFileConfig {
    pub bot_token: Option<String>,

    /// Public URL Telegram should deliver updates to
    pub webhook_url: Option<String>,

    pub api_base: Option<String>,

    /// Seconds between webhook reconciliation passes
    pub reconcile_interval_secs: Option<u64>,
}

/// Outbound delivery configuration
#[derive(Debug, Default, Deserialize)]
pub struct DeliveryFileConfig {
    pub attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

/// Load the TOML config file from `path`, or the standard path when `None`
///
/// Returns `MurmurConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> MurmurConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return MurmurConfigFile::default();
    };

    if !path.exists() {
        return MurmurConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                MurmurConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            MurmurConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the contents are not valid TOML for this schema
pub fn parse_config(content: &str) -> crate::Result<MurmurConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path: `~/.config/murmur/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("murmur").join("config.toml"))
}
