//! Murmur Gateway - messaging bot backend for casual chat replies
//!
//! This library provides the core functionality for the Murmur gateway:
//! - Exactly-once model loading with a fallback source
//! - Reply synthesis (sampling, filtering, placeholders)
//! - WhatsApp (Twilio) and Telegram gateway adapters
//! - Self-healing background loops (webhook reconciliation, liveness)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Gateways                          │
//! │        WhatsApp (Twilio)   │   Telegram Bot API      │
//! └────────────────────┬────────────────────────────────┘
//!                      │ webhooks
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Murmur Gateway                       │
//! │   Ingress  │  Synthesizer  │  Dispatcher  │  Loops   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │        text-generation-inference server(s)           │
//! │             primary   │   fallback                   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod channels;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod retry;
pub mod supervisor;
pub mod synth;

pub use config::Config;
pub use daemon::Daemon;
pub use dispatch::{DeliveryDispatcher, DeliveryReport, Destination, ReplyMessage};
pub use error::{Error, Result};
pub use model::{ModelHandle, ModelProvider, ModelState};
pub use synth::{Generation, GenerationConfig, ResponseSynthesizer};
