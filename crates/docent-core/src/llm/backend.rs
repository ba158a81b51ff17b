//! Chat backend trait and the provider router

use super::{ChatMessage, ChatResponse};
use crate::error::{DocentError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Anything that can answer a chat request
///
/// `provider` selects a registered provider (none = default) and `model`
/// overrides that provider's configured model.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        provider: Option<&str>,
        model: Option<&str>,
    ) -> Result<ChatResponse>;
}

/// Single-provider client used behind the router
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provider name reported back in `ChatResponse::provider`
    fn name(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage], model: Option<&str>) -> Result<String>;
}

/// Dispatches chat calls to registered provider clients by name
pub struct ProviderRouter {
    default_provider: String,
    clients: BTreeMap<String, Arc<dyn ProviderClient>>,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            default_provider: default_provider.into(),
            clients: BTreeMap::new(),
        }
    }

    /// Register a client under its lowercased provider name
    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        self.clients
            .insert(client.name().to_ascii_lowercase(), client);
    }

    pub fn with(mut self, client: Arc<dyn ProviderClient>) -> Self {
        self.register(client);
        self
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(|k| k.as_str())
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }
}

#[async_trait]
impl ChatBackend for ProviderRouter {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        provider: Option<&str>,
        model: Option<&str>,
    ) -> Result<ChatResponse> {
        let name = provider
            .unwrap_or(&self.default_provider)
            .to_ascii_lowercase();
        let client = self
            .clients
            .get(&name)
            .ok_or_else(|| DocentError::ProviderNotConfigured(name.clone()))?;

        tracing::debug!("Routing chat to {} (model: {:?})", name, model);
        let content = client.complete(messages, model).await?;
        Ok(ChatResponse::new(content, Some(client.name().to_string())))
    }
}

/// Map a non-success HTTP reply to the typed error
///
/// 429 and quota/rate-limit bodies become `RateLimited` so the gateway can back off.
pub fn status_error(provider: &str, status: reqwest::StatusCode, body: &str) -> DocentError {
    let message = format!("{} error (HTTP {}): {}", provider, status, body);
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || super::gateway::looks_rate_limited(body)
    {
        DocentError::RateLimited(message)
    } else {
        DocentError::ExternalError(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(&'static str);

    #[async_trait]
    impl ProviderClient for Echo {
        fn name(&self) -> &str {
            self.0
        }

        async fn complete(&self, messages: &[ChatMessage], model: Option<&str>) -> Result<String> {
            Ok(format!(
                "{}:{}:{}",
                self.0,
                model.unwrap_or("-"),
                messages.len()
            ))
        }
    }

    #[tokio::test]
    async fn test_routes_by_name_and_default() {
        let router = ProviderRouter::new("gemini")
            .with(Arc::new(Echo("gemini")))
            .with(Arc::new(Echo("openai")));

        let msgs = vec![ChatMessage::user("hi")];
        let r = router.chat(&msgs, None, None).await.unwrap();
        assert_eq!(r.content, "gemini:-:1");
        assert_eq!(r.provider.as_deref(), Some("gemini"));

        let r = router.chat(&msgs, Some("OpenAI"), Some("gpt-x")).await.unwrap();
        assert_eq!(r.content, "openai:gpt-x:1");
    }

    #[test]
    fn test_status_error_classification() {
        let e = status_error("gemini", reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert!(e.is_rate_limited());
        let e = status_error("gemini", reqwest::StatusCode::FORBIDDEN, "Quota exceeded");
        assert!(e.is_rate_limited());
        let e = status_error("gemini", reqwest::StatusCode::BAD_REQUEST, "bad model");
        assert!(!e.is_rate_limited());
    }

    #[tokio::test]
    async fn test_unknown_provider_errors() {
        let router = ProviderRouter::new("gemini");
        let err = router
            .chat(&[ChatMessage::user("hi")], Some("deepseek"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DocentError::ProviderNotConfigured(_)));
    }
}
