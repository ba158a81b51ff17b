//! Client for OpenAI-compatible `/v1/chat/completions` servers
//!
//! Covers OpenAI itself, DeepSeek, OpenRouter, Anthropic's compatibility
//! endpoint, Ollama and vLLM.

use super::backend::{status_error, ProviderClient};
use super::ChatMessage;
use crate::config::{ProviderEndpoint, SecondaryConfig};
use crate::error::{DocentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenAI-compatible chat client
pub struct OpenAiCompatClient {
    name: String,
    http_client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatClient {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DocentError::Http)?;

        Ok(Self {
            name: name.into(),
            http_client,
            url: url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            temperature: 0.3,
            max_tokens: 4096,
        })
    }

    /// Build from a registered provider endpoint
    pub fn from_endpoint(
        name: &str,
        endpoint: &ProviderEndpoint,
        timeout: Duration,
    ) -> Result<Self> {
        Self::new(
            name,
            &endpoint.url,
            endpoint.api_key.clone(),
            &endpoint.model,
            timeout,
        )
    }

    /// Build the secondary (local) provider
    pub fn from_secondary(config: &SecondaryConfig) -> Result<Self> {
        Self::new(
            "ollama",
            &config.url,
            config.api_key.clone(),
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ProviderClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, messages: &[ChatMessage], model: Option<&str>) -> Result<String> {
        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: &'a [ChatMessage],
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct CompletionResponse {
            choices: Vec<CompletionChoice>,
        }

        #[derive(Deserialize)]
        struct CompletionChoice {
            message: CompletionMessage,
        }

        #[derive(Deserialize)]
        struct CompletionMessage {
            #[serde(default)]
            content: Option<String>,
        }

        let request = ChatRequest {
            model: model.unwrap_or(&self.model),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let url = format!("{}/v1/chat/completions", self.url);
        let mut req = self.http_client.post(&url).json(&request);

        if let Some(ref api_key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                DocentError::Timeout(format!("{}: {}", self.name, e))
            } else {
                DocentError::Http(e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(&self.name, status, &body));
        }

        let completion: CompletionResponse = response.json().await?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| DocentError::Llm(format!("No response from {}", self.name)))
    }
}
