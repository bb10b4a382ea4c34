//! Reply synthesis
//!
//! [`ResponseSynthesizer`] turns a prompt into one short reply. It picks a
//! [`Style`], samples up to a fixed number of candidates and returns the
//! first one that passes the rejection filter. It never fails: when the
//! model is unavailable or every candidate is rejected, a neutral filler is
//! returned instead.

pub mod filter;
pub mod style;
pub mod template;

use std::sync::Arc;

use rand::seq::SliceRandom;

pub use filter::{Rejection, check_candidate, find_leaked_name};
pub use style::{Style, StyleProfile, StyleTable};
pub use template::{extract_reply, render_prompt};

use crate::model::{ModelProvider, SamplingParams};
use crate::{Error, Result};

/// Neutral fillers used when no candidate is acceptable
pub const PLACEHOLDERS: &[&str] = &["...", "Hmm...", "I see.", "Okay."];

/// Longest reply ever returned, in characters
pub const MAX_REPLY_CHARS: usize = 500;

/// Generation parameters
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Candidates sampled before giving up
    pub max_retries: u32,
    /// Accepted replies are cut to this many characters
    pub max_reply_chars: usize,
    /// Top-k sampling threshold
    pub top_k: u32,
    /// Nucleus sampling threshold
    pub top_p: f32,
    /// Penalty against repeated tokens
    pub repetition_penalty: f32,
    /// Per-style length ranges, temperatures and weights
    pub styles: StyleTable,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            max_reply_chars: MAX_REPLY_CHARS,
            top_k: 50,
            top_p: 0.9,
            repetition_penalty: 1.3,
            styles: StyleTable::default(),
        }
    }
}

impl GenerationConfig {
    /// Check retry budget, reply length cap and style table
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::Config(
                "generation max_retries must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_REPLY_CHARS).contains(&self.max_reply_chars) {
            return Err(Error::Config(format!(
                "generation max_reply_chars must be between 1 and {MAX_REPLY_CHARS}, got {}",
                self.max_reply_chars
            )));
        }
        self.styles.validate()
    }

    /// Reply length cap, kept within `1..=MAX_REPLY_CHARS`
    #[must_use]
    pub fn reply_char_limit(&self) -> usize {
        self.max_reply_chars.clamp(1, MAX_REPLY_CHARS)
    }
}

/// A request for one reply
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub style: Style,
    pub max_retries: u32,
}

/// One sampled candidate
#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    pub sampled_text: String,
    pub temperature: f32,
    pub target_length: u32,
}

/// Where the returned text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    /// An accepted model candidate
    Model,
    /// A filler
    Placeholder,
}

/// Result of a generation request
#[derive(Debug, Clone)]
pub struct Generation {
    /// Reply text, never empty
    pub text: String,
    /// Whether the text is a model reply or a filler
    pub source: ReplySource,
    /// Number of candidates sampled
    pub attempts: u32,
}

/// Produces replies from the shared model
pub struct ResponseSynthesizer {
    provider: Arc<ModelProvider>,
    config: GenerationConfig,
}

impl ResponseSynthesizer {
    #[must_use]
    pub const fn new(provider: Arc<ModelProvider>, config: GenerationConfig) -> Self {
        Self { provider, config }
    }

    /// The model provider this synthesizer draws from
    #[must_use]
    pub const fn provider(&self) -> &Arc<ModelProvider> {
        &self.provider
    }

    /// Build a request for `prompt` with a randomly chosen style
    #[must_use]
    pub fn request(&self, prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            style: self.config.styles.choose(&mut rand::thread_rng()),
            max_retries: self.config.max_retries,
        }
    }

    /// Generate a reply to `prompt`
    pub async fn generate(&self, prompt: &str) -> String {
        self.generate_request(&self.request(prompt)).await.text
    }

    /// Run the sample-and-filter loop for `request`
    pub async fn generate_request(&self, request: &GenerationRequest) -> Generation {
        let handle = match self.provider.ensure_ready().await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(error = %e, "no model available, replying with placeholder");
                return Self::placeholder(0);
            }
        };

        let rendered = render_prompt(&request.prompt);
        let profile = self.config.styles.profile(request.style);

        for attempt in 1..=request.max_retries {
            let target_length = profile.target_length(&mut rand::thread_rng());
            let params = SamplingParams {
                temperature: profile.temperature,
                top_k: self.config.top_k,
                top_p: self.config.top_p,
                repetition_penalty: self.config.repetition_penalty,
                max_new_tokens: target_length,
            };

            let candidate = match handle.sample(&rendered, &params).await {
                Ok(sampled_text) => {
                    let attempt = GenerationAttempt {
                        sampled_text,
                        temperature: params.temperature,
                        target_length,
                    };
                    let reply = extract_reply(&attempt.sampled_text);
                    check_candidate(&reply, &request.prompt).map(|()| reply)
                }
                Err(e) => Err(Rejection::Sampling(e.to_string())),
            };

            match candidate {
                Ok(reply) => {
                    tracing::debug!(
                        attempt,
                        style = request.style.as_str(),
                        target_length,
                        "candidate accepted"
                    );
                    return Generation {
                        text: truncate_chars(&reply, self.config.reply_char_limit()),
                        source: ReplySource::Model,
                        attempts: attempt,
                    };
                }
                Err(rejection) => {
                    tracing::debug!(
                        attempt,
                        style = request.style.as_str(),
                        %rejection,
                        "candidate rejected"
                    );
                }
            }
        }

        tracing::warn!(
            attempts = request.max_retries,
            "retry budget exhausted, replying with placeholder"
        );
        Self::placeholder(request.max_retries)
    }

    fn placeholder(attempts: u32) -> Generation {
        let text = PLACEHOLDERS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or("...");

        Generation {
            text: text.to_string(),
            source: ReplySource::Placeholder,
            attempts,
        }
    }
}

/// Cut `text` to at most `max` characters
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}
