use anyhow::{Context, Result};
use async_trait::async_trait;
use common::config::LlmConfig;
use common::retry::Permanent;
use common::RetryPolicy;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Shape the reply must take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    Json,
}

/// One-shot chat completion; every refinement and extraction call goes through it.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], format: ResponseFormat) -> Result<String>;
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<JsonObject>,
}

#[derive(Serialize)]
struct JsonObject {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatClient {
    pub fn new(config: &LlmConfig, api_key: String, retry: RetryPolicy) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.chat_model.clone(),
            client: reqwest::Client::new(),
            retry,
        }
    }

    async fn complete_once(&self, messages: &[ChatMessage], format: ResponseFormat) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.0,
            response_format: match format {
                ResponseFormat::Json => Some(JsonObject { kind: "json_object" }),
                ResponseFormat::Text => None,
            },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to chat completions endpoint")?;

        let status = response.status();
        if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(Permanent(format!("Chat request failed: {} {}", status, body)).into());
        }
        if !status.is_success() {
            anyhow::bail!("Chat request failed: {}", status);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completions response")?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat response contained no message content"))?;

        debug!(model = %self.model, characters = content.len(), "Chat completion received");
        Ok(content)
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn complete(&self, messages: &[ChatMessage], format: ResponseFormat) -> Result<String> {
        self.retry
            .retry("chat_completion", || self.complete_once(messages, format))
            .await
    }
}

/// Strip a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // drop the info string (`json`) up to the first newline
    match body.find('\n') {
        Some(pos) => body[pos + 1..].trim(),
        None => body.trim(),
    }
}
