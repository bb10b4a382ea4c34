//! Messaging gateway adapters
//!
//! Each gateway implements the `Channel` trait so replies can be delivered
//! without knowing which platform they go to.

pub mod telegram;
pub mod whatsapp;

use async_trait::async_trait;

pub use telegram::TelegramChannel;
pub use whatsapp::{TwilioInbound, WhatsAppChannel, twiml_reply};

use crate::Result;

/// A message to send to a gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Conversation or recipient identifier
    pub channel_id: String,

    /// Message text
    pub content: String,
}

impl OutgoingMessage {
    /// Create a simple `text` message
    #[must_use]
    pub const fn text(channel_id: String, content: String) -> Self {
        Self {
            channel_id,
            content,
        }
    }
}

/// Trait for messaging gateway adapters
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name
    fn name(&self) -> &'static str;

    /// Validate credentials before serving traffic
    ///
    /// Default implementation accepts any configuration
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Send a message
    async fn send(&self, message: OutgoingMessage) -> Result<()>;
}
