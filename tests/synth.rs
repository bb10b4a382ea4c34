//! Reply synthesis integration tests
//!
//! Drives the synthesizer through the model provider with scripted models.

use std::sync::Arc;

use async_trait::async_trait;
use murmur_gateway::model::{
    LanguageModel, ModelProvider, ModelSource, ModelState, SamplingParams,
};
use murmur_gateway::synth::{GenerationRequest, ReplySource, Style, find_leaked_name};
use murmur_gateway::{Error, GenerationConfig, ResponseSynthesizer, Result};

mod common;
use common::{
    ScriptedModel, StubSource, continuation, failing_provider, provider_with, synthesizer,
};

const PLACEHOLDERS: [&str; 4] = ["...", "Hmm...", "I see.", "Okay."];

fn request(prompt: &str, style: Style) -> GenerationRequest {
    GenerationRequest {
        prompt: prompt.to_string(),
        style,
        max_retries: GenerationConfig::default().max_retries,
    }
}

/// Returns only the continuation, without echoing the prompt
struct ContinuationOnly(&'static str);

#[async_trait]
impl LanguageModel for ContinuationOnly {
    async fn sample(&self, _prompt: &str, _params: &SamplingParams) -> Result<String> {
        Ok(continuation(self.0))
    }
}

/// Always fails to sample
struct BrokenModel;

#[async_trait]
impl LanguageModel for BrokenModel {
    async fn sample(&self, _prompt: &str, _params: &SamplingParams) -> Result<String> {
        Err(Error::Model("out of memory".to_string()))
    }
}

#[tokio::test]
async fn test_always_rejected_uses_exactly_five_attempts() {
    // Every candidate echoes the prompt
    let model = ScriptedModel::new(&["Hello There"]);
    let synth = synthesizer(provider_with(model.clone()));

    let generation = synth.generate_request(&request("hello there", Style::Short)).await;

    assert_eq!(model.calls(), 5);
    assert_eq!(generation.attempts, 5);
    assert_eq!(generation.source, ReplySource::Placeholder);
    assert!(PLACEHOLDERS.contains(&generation.text.as_str()));
}

#[tokio::test]
async fn test_sampling_errors_count_as_attempts() {
    let synth = synthesizer(provider_with(Arc::new(BrokenModel)));

    let generation = synth.generate_request(&request("hi", Style::Medium)).await;

    assert_eq!(generation.attempts, 5);
    assert_eq!(generation.source, ReplySource::Placeholder);
}

#[tokio::test]
async fn test_first_acceptable_candidate_wins() {
    let model = ScriptedModel::new(&["", "talk to Priya", "yeah, same here", "never reached"]);
    let synth = synthesizer(provider_with(model.clone()));

    let generation = synth.generate_request(&request("long day", Style::Short)).await;

    assert_eq!(generation.text, "yeah, same here");
    assert_eq!(generation.source, ReplySource::Model);
    assert_eq!(generation.attempts, 3);
    assert_eq!(model.calls(), 3);
}

#[tokio::test]
async fn test_reply_is_truncated_to_500_chars() {
    let long = "la ".repeat(400);
    let model = ScriptedModel::new(&[long.as_str()]);
    let synth = synthesizer(provider_with(model));

    let text = synth.generate("sing something").await;

    assert!(text.chars().count() <= 500, "reply too long: {}", text.len());
    assert!(!text.is_empty());
}

#[tokio::test]
async fn test_accepted_reply_has_no_echo_or_names() {
    let model = ScriptedModel::new(&["what's up", "meet Jordan later", "not much, chilling"]);
    let synth = synthesizer(provider_with(model));

    let text = synth.generate("What's up").await;

    assert_eq!(text, "not much, chilling");
    assert_ne!(text.to_lowercase(), "what's up");
    assert!(find_leaked_name(&text).is_none());
}

#[tokio::test]
async fn test_only_first_line_is_kept() {
    let model = ScriptedModel::new(&["\n  first line  \nsecond line<|endoftext|>"]);
    let synth = synthesizer(provider_with(model));

    assert_eq!(synth.generate("hey").await, "first line");
}

#[tokio::test]
async fn test_continuation_only_backend() {
    let synth = synthesizer(provider_with(Arc::new(ContinuationOnly("sounds fun"))));
    assert_eq!(synth.generate("want to go out").await, "sounds fun");
}

#[tokio::test]
async fn test_style_sets_sampling_parameters() {
    let model = ScriptedModel::new(&["ok cool"]);
    let synth = synthesizer(provider_with(model.clone()));
    let table = GenerationConfig::default().styles;

    for style in Style::ALL {
        synth.generate_request(&request("so", style)).await;
    }

    let params = model.params();
    assert_eq!(params.len(), 3);
    for (style, params) in Style::ALL.iter().zip(&params) {
        let profile = table.profile(*style);
        assert!((params.temperature - profile.temperature).abs() < f32::EPSILON);
        assert!(params.max_new_tokens >= profile.min_tokens);
        assert!(params.max_new_tokens <= profile.max_tokens);
        assert_eq!(params.top_k, 50);
        assert!((params.top_p - 0.9).abs() < f32::EPSILON);
        assert!((params.repetition_penalty - 1.3).abs() < f32::EPSILON);
    }
}

#[tokio::test]
async fn test_unavailable_model_yields_placeholder_without_sampling() {
    let provider = failing_provider();
    let synth = synthesizer(provider.clone());

    let generation = synth.generate_request(&request("hi", Style::Short)).await;

    assert_eq!(generation.attempts, 0);
    assert_eq!(generation.source, ReplySource::Placeholder);
    assert!(PLACEHOLDERS.contains(&generation.text.as_str()));
    assert_eq!(provider.state(), ModelState::Failed);
}

#[tokio::test]
async fn test_concurrent_requests_load_model_once() {
    let model = ScriptedModel::new(&["fine"]);
    let source = StubSource::ok("stub", model);
    let provider = Arc::new(ModelProvider::new(source.clone(), None));
    let synth = Arc::new(ResponseSynthesizer::new(
        provider.clone(),
        GenerationConfig::default(),
    ));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let synth = Arc::clone(&synth);
            tokio::spawn(async move { synth.generate(&format!("message {i}")).await })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), "fine");
    }

    assert_eq!(source.loads(), 1);
    assert_eq!(provider.state(), ModelState::Ready);
}

#[tokio::test]
async fn test_fallback_serves_replies() {
    let primary = StubSource::failing("primary");
    let fallback = StubSource::ok("fallback", ScriptedModel::new(&["smaller but fine"]));
    let provider = Arc::new(ModelProvider::new(
        primary.clone(),
        Some(fallback.clone() as Arc<dyn ModelSource>),
    ));
    let synth = synthesizer(provider.clone());

    assert_eq!(synth.generate("how's it going").await, "smaller but fine");
    assert_eq!(provider.state(), ModelState::FallbackReady);

    // A second request reuses the fallback; nothing reloads
    synth.generate("and now").await;
    assert_eq!(primary.loads(), 1);
    assert_eq!(fallback.loads(), 1);
}

#[tokio::test]
async fn test_oversized_reply_cap_is_held_to_500_chars() {
    let long = "na ".repeat(400);
    let model = ScriptedModel::new(&[long.as_str()]);
    let config = GenerationConfig {
        max_reply_chars: 2000,
        ..GenerationConfig::default()
    };
    let synth = ResponseSynthesizer::new(provider_with(model), config);

    let generation = synth.generate_request(&request("go on", Style::Long)).await;

    assert_eq!(generation.source, ReplySource::Model);
    assert!(generation.text.chars().count() <= 500);
}

#[tokio::test]
async fn test_zero_reply_cap_still_returns_text() {
    let model = ScriptedModel::new(&["fine thanks"]);
    let config = GenerationConfig {
        max_reply_chars: 0,
        ..GenerationConfig::default()
    };
    let synth = ResponseSynthesizer::new(provider_with(model), config);

    let generation = synth.generate_request(&request("how are you", Style::Short)).await;

    assert_eq!(generation.source, ReplySource::Model);
    assert!(!generation.text.is_empty());
}
