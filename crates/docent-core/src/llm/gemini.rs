//! Client for the Gemini `generateContent` API

use super::backend::{status_error, ProviderClient};
use super::{ChatMessage, Role};
use crate::config::ProviderEndpoint;
use crate::error::{DocentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct GeminiClient {
    http_client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GeminiClient {
    pub fn new(endpoint: &ProviderEndpoint, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DocentError::Http)?;

        Ok(Self {
            http_client,
            url: endpoint.url.trim_end_matches('/').to_string(),
            api_key: endpoint.api_key.clone(),
            model: endpoint.model.clone(),
            temperature: 0.3,
            max_tokens: 4096,
        })
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// System messages become `systemInstruction`; the rest map to user/model turns
    fn build_request(&self, messages: &[ChatMessage]) -> GenerateRequest {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let contents = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| Content {
                role: Some(
                    match m.role {
                        Role::Assistant => "model",
                        _ => "user",
                    }
                    .to_string(),
                ),
                parts: vec![Part {
                    text: Some(m.content.clone()),
                }],
            })
            .collect();

        GenerateRequest {
            contents,
            system_instruction: (!system.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part {
                    text: Some(system.join("\n\n")),
                }],
            }),
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        }
    }
}

fn response_text(response: GenerateResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");
    Some(text)
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, messages: &[ChatMessage], model: Option<&str>) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| DocentError::ProviderNotConfigured("GEMINI_API_KEY not set".into()))?;

        let model = model.unwrap_or(&self.model);
        let url = format!("{}/v1beta/models/{}:generateContent", self.url, model);

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&self.build_request(messages))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DocentError::Timeout(format!("gemini: {}", e))
                } else {
                    DocentError::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("gemini", status, &body));
        }

        let parsed: GenerateResponse = response.json().await?;
        response_text(parsed)
            .ok_or_else(|| DocentError::Llm(format!("No candidates from gemini ({})", model)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKind;

    fn client() -> GeminiClient {
        let endpoint = ProviderEndpoint {
            api: ApiKind::Gemini,
            url: "http://localhost:1/".to_string(),
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
        };
        GeminiClient::new(&endpoint, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_request_splits_system_instruction() {
        let req = client().build_request(&[
            ChatMessage::system("be brief"),
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi"),
        ]);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 4096);
    }

    #[test]
    fn test_response_text_joins_parts() {
        let raw = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"a"},{"text":"b"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response_text(parsed).as_deref(), Some("ab"));

        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(response_text(empty).is_none());
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let err = client()
            .complete(&[ChatMessage::user("x")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, DocentError::ProviderNotConfigured(_)));
    }
}
