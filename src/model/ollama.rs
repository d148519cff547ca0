use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::ModelClient;
use crate::error::{LanternError, Result};
use crate::settings::ModelConfig;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

/// Decoding parameters sent with every completion.
#[derive(Debug, Clone, Copy, Serialize)]
struct GenerateOptions {
    temperature: f64,
    num_ctx: usize,
    num_predict: usize,
    repeat_penalty: f64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Client for completions and embeddings via the Ollama HTTP API.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    embedding_model: String,
    options: GenerateOptions,
    request_timeout: Duration,
    ping_timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &ModelConfig) -> Self {
        crate::ensure_tls_provider();
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            options: GenerateOptions {
                temperature: config.temperature,
                num_ctx: config.num_ctx,
                num_predict: config.num_predict,
                repeat_penalty: config.repeat_penalty,
            },
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            ping_timeout: Duration::from_secs(config.ping_timeout_secs),
        }
    }

    /// Send a POST and turn transport failures into connectivity errors.
    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(classify_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LanternError::Model(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }
        Ok(response)
    }
}

/// Connection refusals and timeouts mean the service is unreachable; anything
/// else is an ordinary HTTP failure.
fn classify_send_error(e: reqwest::Error) -> LanternError {
    if e.is_connect() || e.is_timeout() {
        LanternError::ModelUnavailable(e.to_string())
    } else {
        LanternError::Http(e)
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: self.options,
        };

        let start = std::time::Instant::now();
        let result: GenerateResponse = self
            .post_json("/api/generate", &request)
            .await?
            .json()
            .await
            .map_err(|e| LanternError::Model(format!("Failed to parse completion: {}", e)))?;

        tracing::debug!(
            "Completion from {}: {} chars in {:?}",
            self.model,
            result.response.len(),
            start.elapsed()
        );
        Ok(result.response)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            prompt: text,
        };

        let result: EmbeddingResponse = self
            .post_json("/api/embeddings", &request)
            .await?
            .json()
            .await
            .map_err(|e| LanternError::Model(format!("Failed to parse embedding: {}", e)))?;

        if result.embedding.is_empty() {
            return Err(LanternError::Model("Empty embedding returned".into()));
        }
        Ok(result.embedding)
    }

    async fn ping(&self) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(self.ping_timeout)
            .send()
            .await
            .map_err(|e| LanternError::ModelUnavailable(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(LanternError::ModelUnavailable(format!(
                "{} answered {}",
                self.base_url,
                resp.status()
            )))
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
