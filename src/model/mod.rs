//! Model acquisition
//!
//! [`ModelProvider`] owns the single [`ModelHandle`] of the process. The
//! handle is acquired lazily on first use: the primary source is tried,
//! then the fallback. Concurrent first callers wait on the same load, and
//! once a terminal state is reached it never changes.
//!
//! ```text
//! Unloaded ──▶ Loading ──▶ Ready           (primary loaded)
//!                      ├─▶ FallbackReady   (primary failed, fallback loaded)
//!                      └─▶ Failed          (both failed)
//! ```

mod tgi;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use tokio::sync::OnceCell;

pub use tgi::TgiSource;

use crate::config::ModelConfig;
use crate::retry::{RetryPolicy, retry};
use crate::{Error, Result};

/// Lifecycle state of the model handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    /// Nobody has asked for the model yet
    Unloaded,
    /// A load is in progress
    Loading,
    /// The primary model is loaded
    Ready,
    /// The primary failed and the fallback model is loaded
    FallbackReady,
    /// Both sources failed; terminal
    Failed,
}

impl ModelState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Unloaded => 0,
            Self::Loading => 1,
            Self::Ready => 2,
            Self::FallbackReady => 3,
            Self::Failed => 4,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Loading,
            2 => Self::Ready,
            3 => Self::FallbackReady,
            4 => Self::Failed,
            _ => Self::Unloaded,
        }
    }

    /// Whether a model is available for generation
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready | Self::FallbackReady)
    }

    /// Short lowercase label for logs and status payloads
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::FallbackReady => "fallback_ready",
            Self::Failed => "failed",
        }
    }
}

/// Which source produced the loaded model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelOrigin {
    /// The configured primary source
    Primary,
    /// The smaller fallback source
    Fallback,
}

impl ModelOrigin {
    /// Short lowercase label for logs and status payloads
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

/// Sampling parameters for a single continuation
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    /// Softmax temperature
    pub temperature: f32,
    /// Keep only the `top_k` most likely tokens
    pub top_k: u32,
    /// Nucleus sampling threshold
    pub top_p: f32,
    /// Penalty applied to already generated tokens
    pub repetition_penalty: f32,
    /// Upper bound on generated tokens
    pub max_new_tokens: u32,
}

/// A loaded generation backend
///
/// Implementations must not mutate state visible to other callers: the
/// same model serves concurrent requests.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Sample one continuation of `prompt`
    ///
    /// The returned text may include the prompt itself; callers extract
    /// the part they need.
    async fn sample(&self, prompt: &str, params: &SamplingParams) -> Result<String>;
}

/// Somewhere a model can be loaded from
#[async_trait]
pub trait ModelSource: Send + Sync {
    /// Identifier used in logs
    fn id(&self) -> &str;

    /// Acquire the model
    async fn load(&self) -> Result<Arc<dyn LanguageModel>>;
}

/// Read-only reference to the loaded model
#[derive(Clone)]
pub struct ModelHandle {
    id: String,
    origin: ModelOrigin,
    model: Arc<dyn LanguageModel>,
}

impl ModelHandle {
    /// Identifier of the source the model came from
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this is the primary or the fallback model
    #[must_use]
    pub const fn origin(&self) -> ModelOrigin {
        self.origin
    }

    /// Whether both handles point at the same loaded model
    #[must_use]
    pub fn shares_model_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.model, &other.model)
    }

    /// Sample one continuation
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails
    pub async fn sample(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        self.model.sample(prompt, params).await
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Owner of the process-wide model handle
pub struct ModelProvider {
    primary: Arc<dyn ModelSource>,
    fallback: Option<Arc<dyn ModelSource>>,
    load_policy: RetryPolicy,
    state: AtomicU8,
    /// Terminal outcome of the one and only load sequence
    outcome: OnceCell<std::result::Result<ModelHandle, String>>,
}

impl ModelProvider {
    /// Create a provider with a primary and an optional fallback source
    #[must_use]
    pub fn new(primary: Arc<dyn ModelSource>, fallback: Option<Arc<dyn ModelSource>>) -> Self {
        Self {
            primary,
            fallback,
            load_policy: RetryPolicy::none(),
            state: AtomicU8::new(ModelState::Unloaded.as_u8()),
            outcome: OnceCell::new(),
        }
    }

    /// Override the retry policy applied to each source load
    #[must_use]
    pub fn with_load_policy(mut self, policy: RetryPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    /// Build a provider backed by inference servers from configuration
    ///
    /// # Errors
    ///
    /// Returns error if a model URL is invalid
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let primary: Arc<dyn ModelSource> =
            Arc::new(TgiSource::new(&config.primary_url, config.request_timeout)?);
        let fallback = match &config.fallback_url {
            Some(url) => {
                Some(Arc::new(TgiSource::new(url, config.request_timeout)?) as Arc<dyn ModelSource>)
            }
            None => None,
        };

        Ok(Self::new(primary, fallback).with_load_policy(config.load_retry.clone()))
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ModelState {
        ModelState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The loaded handle, if a load already succeeded
    #[must_use]
    pub fn handle(&self) -> Option<ModelHandle> {
        self.outcome.get().and_then(|o| o.as_ref().ok()).cloned()
    }

    /// Return the model, loading it on first use
    ///
    /// Idempotent: after the first call completes, later calls return the
    /// cached outcome without touching any source.
    ///
    /// # Errors
    ///
    /// Returns `Error::ModelUnavailable` if neither source could be loaded
    pub async fn ensure_ready(&self) -> Result<ModelHandle> {
        self.outcome
            .get_or_init(|| self.load())
            .await
            .clone()
            .map_err(Error::ModelUnavailable)
    }

    async fn load(&self) -> std::result::Result<ModelHandle, String> {
        self.set_state(ModelState::Loading);
        tracing::info!(source = self.primary.id(), "loading primary model");

        let primary_err = match self.load_from(&*self.primary, ModelOrigin::Primary).await {
            Ok(handle) => {
                self.set_state(ModelState::Ready);
                tracing::info!(source = handle.id(), "primary model ready");
                return Ok(handle);
            }
            Err(e) => e,
        };

        tracing::warn!(
            source = self.primary.id(),
            error = %primary_err,
            "primary model failed to load"
        );

        let Some(fallback) = &self.fallback else {
            self.set_state(ModelState::Failed);
            tracing::error!("no fallback model configured");
            return Err(format!("primary {}: {primary_err}", self.primary.id()));
        };

        tracing::info!(source = fallback.id(), "loading fallback model");
        match self.load_from(&**fallback, ModelOrigin::Fallback).await {
            Ok(handle) => {
                self.set_state(ModelState::FallbackReady);
                tracing::info!(source = handle.id(), "fallback model ready");
                Ok(handle)
            }
            Err(fallback_err) => {
                self.set_state(ModelState::Failed);
                tracing::error!(
                    source = fallback.id(),
                    error = %fallback_err,
                    "fallback model failed to load"
                );
                Err(format!(
                    "primary {}: {primary_err}; fallback {}: {fallback_err}",
                    self.primary.id(),
                    fallback.id()
                ))
            }
        }
    }

    async fn load_from(&self, source: &dyn ModelSource, origin: ModelOrigin) -> Result<ModelHandle> {
        let model = retry(&self.load_policy, "model load", || source.load()).await?;
        Ok(ModelHandle {
            id: source.id().to_string(),
            origin,
            model,
        })
    }

    fn set_state(&self, state: ModelState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

impl fmt::Debug for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelProvider")
            .field("primary", &self.primary.id())
            .field("fallback", &self.fallback.as_ref().map(|s| s.id().to_string()))
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
