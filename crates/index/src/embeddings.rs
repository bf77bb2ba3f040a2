use anyhow::{Context, Result};
use async_trait::async_trait;
use common::config::LlmConfig;
use common::retry::Permanent;
use common::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Text to vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// OpenAI-compatible `/embeddings` client.
#[derive(Clone)]
pub struct EmbeddingClient {
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    client: reqwest::Client,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(config: &LlmConfig, api_key: String, retry: RetryPolicy) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions,
            client: reqwest::Client::new(),
            retry,
        }
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        let status = response.status();
        if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(Permanent(format!("Embedding request failed: {} {}", status, body)).into());
        }
        if !status.is_success() {
            anyhow::bail!("Embedding request failed: {}", status);
        }

        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        embedding_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow::anyhow!("Embedding response contained no vectors"))
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    /// Generate embedding for text
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.retry.retry("embed", || self.embed_once(text)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_and_response_shapes() {
        let request = EmbeddingRequest {
            model: "text-embedding-3-small",
            input: "hola",
            dimensions: 8,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["input"], "hola");
        assert_eq!(value["dimensions"], 8);

        let response: EmbeddingResponse = serde_json::from_str(
            r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.5,-1.0]}],"model":"m"}"#,
        )
        .unwrap();
        assert_eq!(response.data[0].embedding, vec![0.5, -1.0]);
    }
}
