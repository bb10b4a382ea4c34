//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use murmur_gateway::channels::{Channel, OutgoingMessage};
use murmur_gateway::model::{LanguageModel, ModelProvider, ModelSource, SamplingParams};
use murmur_gateway::synth::template::RESPONDER_TAG;
use murmur_gateway::{Error, GenerationConfig, ResponseSynthesizer, Result};

/// Model returning replies from a fixed script, repeating the last one
pub struct ScriptedModel {
    replies: Vec<String>,
    calls: AtomicUsize,
    params: Mutex<Vec<SamplingParams>>,
}

impl ScriptedModel {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: replies.iter().map(ToString::to_string).collect(),
            calls: AtomicUsize::new(0),
            params: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn params(&self) -> Vec<SamplingParams> {
        self.params.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn sample(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.params.lock().unwrap().push(params.clone());
        let reply = self
            .replies
            .get(n)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_default();
        // Echo the prompt back like a full-text backend would
        Ok(format!("{prompt}{reply}"))
    }
}

/// Source handing out a prepared model, or failing
pub struct StubSource {
    id: &'static str,
    model: Option<Arc<dyn LanguageModel>>,
    loads: AtomicUsize,
}

impl StubSource {
    pub fn ok(id: &'static str, model: Arc<dyn LanguageModel>) -> Arc<Self> {
        Arc::new(Self {
            id,
            model: Some(model),
            loads: AtomicUsize::new(0),
        })
    }

    pub fn failing(id: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id,
            model: None,
            loads: AtomicUsize::new(0),
        })
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelSource for StubSource {
    fn id(&self) -> &str {
        self.id
    }

    async fn load(&self) -> Result<Arc<dyn LanguageModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.model
            .clone()
            .ok_or_else(|| Error::Model(format!("{} failed to load", self.id)))
    }
}

/// Provider backed by `model`
pub fn provider_with(model: Arc<dyn LanguageModel>) -> Arc<ModelProvider> {
    Arc::new(ModelProvider::new(StubSource::ok("stub", model), None))
}

/// Provider whose sources all fail
pub fn failing_provider() -> Arc<ModelProvider> {
    Arc::new(ModelProvider::new(
        StubSource::failing("primary"),
        Some(StubSource::failing("fallback") as Arc<dyn ModelSource>),
    ))
}

/// Synthesizer with default settings over `provider`
pub fn synthesizer(provider: Arc<ModelProvider>) -> Arc<ResponseSynthesizer> {
    Arc::new(ResponseSynthesizer::new(provider, GenerationConfig::default()))
}

/// A sampled continuation as a full-text backend would return it
pub fn continuation(reply: &str) -> String {
    format!("{RESPONDER_TAG}{reply}")
}

/// Channel that records every message it is asked to send
#[derive(Default)]
pub struct MockChannel {
    sent: Mutex<Vec<OutgoingMessage>>,
}

impl MockChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
