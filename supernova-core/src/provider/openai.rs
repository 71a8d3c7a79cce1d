use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    error::FetchError,
    provider::{cancellable, truncate_body},
};

use super::ChatProvider;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Chat-completions client.
#[derive(Debug, Clone)]
pub struct ChatService {
    api_key: String,
    model: String,
    http: Client,
    endpoint: Url,
}

impl ChatService {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: String, base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build OpenAI HTTP client")?;

        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let endpoint = Url::parse(&base)
            .and_then(|u| u.join("v1/chat/completions"))
            .with_context(|| format!("Invalid OpenAI base URL: {base_url}"))?;

        Ok(Self { api_key, model: DEFAULT_MODEL.to_string(), http, endpoint })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send_prompt(&self, prompt: &str) -> Result<String, FetchError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
        };
        tracing::debug!(model = self.model(), "sending chat completion");

        let res = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("chat completion request failed: {e}");
                FetchError::from(e)
            })?;

        let status = res.status();
        let body = res.text().await.map_err(|e| {
            tracing::error!("failed to read chat completion response body: {e}");
            FetchError::from(e)
        })?;

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), body = %truncate_body(&body), "chat API request failed");
            return Err(FetchError::Transport(format!(
                "chat API request failed with status {}",
                status.as_u16()
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %truncate_body(&body), "failed to parse chat response: {e}");
            FetchError::Decode(format!("chat completion: {e}"))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| {
                tracing::error!("no valid response from chat API");
                FetchError::Decode("no valid response from chat API".to_string())
            })
    }
}

#[async_trait]
impl ChatProvider for ChatService {
    async fn complete(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError> {
        if prompt.trim().is_empty() {
            return Err(FetchError::InvalidQuery("message is required".to_string()));
        }

        cancellable(cancel, self.send_prompt(prompt)).await
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}
