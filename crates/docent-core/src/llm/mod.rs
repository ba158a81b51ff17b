//! LLM integration
//!
//! Provides:
//! - A provider router over Gemini and OpenAI-compatible backends
//! - Fallback chain parsing
//! - A retrying gateway used by every pipeline stage that talks to a model

mod backend;
mod chain;
mod gateway;
mod gemini;
mod message;
mod openai;

pub use backend::{status_error, ChatBackend, ProviderClient, ProviderRouter};
pub use chain::{
    default_chain, parse_chain, parse_provider_entry, ProviderPreference, SUPPORTED_PROVIDERS,
};
pub use gateway::{
    looks_rate_limited, CallOutcome, Completion, ProviderGateway, RetryPolicy, SecondaryProvider,
};
pub use gemini::GeminiClient;
pub use message::{ChatMessage, ChatResponse, Role};
pub use openai::OpenAiCompatClient;

use crate::config::{ApiKind, Config};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Build a router with every configured provider registered
pub fn router_from_config(config: &Config) -> Result<ProviderRouter> {
    let timeout = Duration::from_secs(config.llm.timeout_secs);
    let mut router = ProviderRouter::new(&config.llm.default_provider);

    for (name, endpoint) in &config.llm.providers {
        let client: Arc<dyn ProviderClient> = match endpoint.api {
            ApiKind::Gemini => Arc::new(
                GeminiClient::new(endpoint, timeout)?
                    .with_sampling(config.llm.temperature, config.llm.max_tokens),
            ),
            ApiKind::OpenAi => Arc::new(
                OpenAiCompatClient::from_endpoint(name, endpoint, timeout)?
                    .with_sampling(config.llm.temperature, config.llm.max_tokens),
            ),
        };
        router.register(client);
    }

    Ok(router)
}

/// Build the full gateway (router, chain, retry policy, secondary provider)
pub fn gateway_from_config(config: &Config) -> Result<ProviderGateway> {
    let router = router_from_config(config)?;
    let chain = parse_chain(
        config.llm.provider_chain.as_deref(),
        Some(&config.llm.gemini_model),
    );
    let mut gateway =
        ProviderGateway::new(Arc::new(router), chain).with_retry(RetryPolicy::from(&config.retry));

    if config.secondary.enabled {
        let client = OpenAiCompatClient::from_secondary(&config.secondary)?
            .with_sampling(config.llm.temperature, config.llm.max_tokens);
        gateway = gateway.with_secondary(SecondaryProvider {
            client: Arc::new(client),
            model: config.secondary.model.clone(),
            timeout: Duration::from_secs(config.secondary.timeout_secs),
        });
    }

    Ok(gateway)
}
