//! Error types for the Murmur gateway

use thiserror::Error;

/// Result type alias for Murmur operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Murmur gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Neither the primary nor the fallback model could be acquired
    ///
    /// This is the only fatal error category: without a model no reply can
    /// be generated.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// A single model source failed to load or sample
    #[error("model error: {0}")]
    Model(String),

    /// Delivery to a gateway failed
    #[error("channel error: {0}")]
    Channel(String),

    /// Webhook verification or repair failed
    #[error("webhook error: {0}")]
    Webhook(String),

    /// An external call exceeded its time bound
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
