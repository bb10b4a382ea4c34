//! Text-generation-inference model source
//!
//! Talks to a Hugging Face text-generation-inference server. Loading probes
//! `GET /info`; sampling posts to `POST /generate`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{LanguageModel, ModelSource, SamplingParams};
use crate::{Error, Result};

/// Model source backed by a text-generation-inference server
pub struct TgiSource {
    base_url: Url,
    client: Client,
    timeout: Duration,
}

impl TgiSource {
    /// Create a source for the server at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        // A trailing slash keeps `Url::join` from dropping the last path segment
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| Error::Config(format!("invalid model URL {base_url}: {e}")))?;

        Ok(Self {
            base_url,
            client: Client::new(),
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("invalid model endpoint {path}: {e}")))
    }
}

#[async_trait]
impl ModelSource for TgiSource {
    fn id(&self) -> &str {
        self.base_url.as_str()
    }

    async fn load(&self) -> Result<Arc<dyn LanguageModel>> {
        let response = self
            .client
            .get(self.endpoint("info")?)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Model(format!("model server unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Model(format!("model info error: {status} - {body}")));
        }

        let info: InfoResponse = response
            .json()
            .await
            .map_err(|e| Error::Model(format!("malformed model info: {e}")))?;

        if info.model_id.trim().is_empty() {
            return Err(Error::Model("model info has an empty model_id".to_string()));
        }

        tracing::info!(model_id = %info.model_id, server = %self.base_url, "model server ready");

        Ok(Arc::new(TgiModel {
            client: self.client.clone(),
            generate_url: self.endpoint("generate")?,
            timeout: self.timeout,
        }))
    }
}

/// A model served by a text-generation-inference server
struct TgiModel {
    client: Client,
    generate_url: Url,
    timeout: Duration,
}

#[async_trait]
impl LanguageModel for TgiModel {
    async fn sample(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let request = GenerateRequest {
            inputs: prompt,
            parameters: GenerateParameters {
                do_sample: true,
                temperature: params.temperature,
                top_k: params.top_k,
                top_p: params.top_p,
                repetition_penalty: params.repetition_penalty,
                max_new_tokens: params.max_new_tokens,
                return_full_text: true,
            },
        };

        let response = self
            .client
            .post(self.generate_url.clone())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Model(format!("generate request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Model(format!("generate error: {status} - {body}")));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Model(format!("malformed generate response: {e}")))?;

        Ok(generated.generated_text)
    }
}

/// `GET /info` response (only the fields we check)
#[derive(Deserialize)]
struct InfoResponse {
    model_id: String,
}

/// `POST /generate` request body
#[derive(Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    parameters: GenerateParameters,
}

#[derive(Serialize)]
struct GenerateParameters {
    do_sample: bool,
    temperature: f32,
    top_k: u32,
    top_p: f32,
    repetition_penalty: f32,
    max_new_tokens: u32,
    return_full_text: bool,
}

/// `POST /generate` response body
#[derive(Deserialize)]
struct GenerateResponse {
    generated_text: String,
}
