//! [`InferenceModel`] served by the stack's Ollama container.

use super::InferenceModel;
use crate::errors::{StackError, StackResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// HTTP client for one model on an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaModel {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaModel {
    /// Creates a client for `model` at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        }
    }

    async fn post<T>(&self, path: &str, body: serde_json::Value) -> StackResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, model = %self.model, "Inference request");
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(StackError::Http(format!(
                "POST {url} failed: status={status} body={text}"
            )));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl InferenceModel for OllamaModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> StackResult<Vec<f32>> {
        let body = serde_json::json!({ "model": self.model, "prompt": text });
        let response: EmbeddingResponse = self.post("/api/embeddings", body).await?;
        if response.embedding.is_empty() {
            return Err(StackError::Http(format!(
                "model {} returned an empty embedding",
                self.model
            )));
        }
        Ok(response.embedding)
    }

    async fn generate(&self, prompt: &str) -> StackResult<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": 0.0 }
        });
        let response: GenerateResponse = self.post("/api/generate", body).await?;
        Ok(response.response)
    }
}
