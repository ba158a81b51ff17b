//! Provider gateway: ordered fallback across the provider chain
//!
//! `chat` makes one attempt per preference and is used for the cheap
//! preprocessing calls. `generate` is the answer path: rate-limited calls are
//! retried on the same model with exponential backoff and jitter before moving
//! on, and the secondary provider is tried once the chain is exhausted.

use super::backend::{ChatBackend, ProviderClient};
use super::chain::ProviderPreference;
use super::{ChatMessage, ChatResponse};
use crate::config::RetryConfig;
use crate::error::DocentError;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

lazy_static! {
    static ref RATE_LIMIT_PATTERN: Regex = Regex::new(
        r"(?i)rate[ _-]?limit|quota|too many requests|\b(?:http|status(?: code)?|code|error)\W{0,3}429\b"
    )
    .unwrap();
}

/// Longest configurable pause, in seconds
const MAX_CONFIGURED_DELAY_SECS: f64 = 3600.0;

/// Config seconds to a `Duration`; non-finite or negative values clamp into range
fn config_secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.clamp(0.0, MAX_CONFIGURED_DELAY_SECS)).unwrap_or_default()
}

/// True when an error text reads like a quota or rate-limit refusal
pub fn looks_rate_limited(text: &str) -> bool {
    RATE_LIMIT_PATTERN.is_match(text)
}

/// Result of a single provider call
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Success(ChatResponse),
    /// Provider answered with blank text
    Empty,
    /// Transient: worth retrying the same model after a pause
    RateLimited(String),
    /// Permanent for this preference: move on
    Failed(String),
}

impl CallOutcome {
    pub fn from_result(result: crate::error::Result<ChatResponse>) -> Self {
        match result {
            Ok(response) if response.content.trim().is_empty() => CallOutcome::Empty,
            Ok(response) => CallOutcome::Success(response),
            Err(e) => classify_error(&e),
        }
    }
}

fn classify_error(error: &DocentError) -> CallOutcome {
    let text = error.to_string();
    if error.is_rate_limited() || looks_rate_limited(&text) {
        CallOutcome::RateLimited(text)
    } else {
        CallOutcome::Failed(text)
    }
}

/// Non-empty generated text and the label of whoever produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub label: String,
}

/// Exponential backoff for rate-limited calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per model
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add uniform(0,1) seconds to every pause
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            attempts: config.attempts.max(1),
            base_delay: config_secs(config.base_delay_secs),
            max_delay: config_secs(config.max_delay_secs),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// `min(base * 2^attempt, max) + jitter`, attempt counted from zero
    pub fn delay_for(&self, attempt: u32, jitter: f64) -> Duration {
        let factor = 2f64.powi(attempt.min(30) as i32);
        let backoff = (self.base_delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(backoff + jitter.clamp(0.0, 1.0)).unwrap_or(self.max_delay)
    }

    fn next_delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter { unit_jitter() } else { 0.0 };
        self.delay_for(attempt, jitter)
    }
}

/// Uniform draw in `[0, 1)` from the low 53 random bits of a v4 uuid
fn unit_jitter() -> f64 {
    const MANTISSA: u32 = 53;
    let bits = (uuid::Uuid::new_v4().as_u128() as u64) & ((1u64 << MANTISSA) - 1);
    bits as f64 / (1u64 << MANTISSA) as f64
}

/// Local provider tried after the whole chain fails
pub struct SecondaryProvider {
    pub client: Arc<dyn ProviderClient>,
    pub model: String,
    pub timeout: Duration,
}

impl SecondaryProvider {
    fn label(&self) -> String {
        format!("{}-{}", self.client.name(), self.model)
    }
}

/// Retrying, ordered-fallback client over a chat backend
pub struct ProviderGateway {
    backend: Arc<dyn ChatBackend>,
    chain: Vec<ProviderPreference>,
    retry: RetryPolicy,
    secondary: Option<SecondaryProvider>,
}

impl ProviderGateway {
    /// `chain` must be non-empty; use `llm::parse_chain` to build one
    pub fn new(backend: Arc<dyn ChatBackend>, chain: Vec<ProviderPreference>) -> Self {
        let chain = if chain.is_empty() {
            super::chain::default_chain(None)
        } else {
            chain
        };
        Self {
            backend,
            chain,
            retry: RetryPolicy::default(),
            secondary: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_secondary(mut self, secondary: SecondaryProvider) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn chain(&self) -> &[ProviderPreference] {
        &self.chain
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    async fn call(&self, preference: &ProviderPreference, messages: &[ChatMessage]) -> CallOutcome {
        let result = self
            .backend
            .chat(
                messages,
                preference.provider.as_deref(),
                preference.model.as_deref(),
            )
            .await;
        CallOutcome::from_result(result)
    }

    fn completion(preference: &ProviderPreference, response: ChatResponse) -> Completion {
        let label = response
            .provider
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| preference.label.clone());
        Completion {
            content: response.content.trim().to_string(),
            label,
        }
    }

    /// One attempt per preference, first non-empty answer wins
    pub async fn chat(&self, messages: &[ChatMessage], purpose: &str) -> Option<Completion> {
        for preference in &self.chain {
            match self.call(preference, messages).await {
                CallOutcome::Success(response) => {
                    tracing::debug!("{} answered by {}", purpose, preference.label);
                    return Some(Self::completion(preference, response));
                }
                CallOutcome::Empty => {
                    tracing::warn!("Provider {} returned empty output for {}", preference.label, purpose);
                }
                CallOutcome::RateLimited(e) | CallOutcome::Failed(e) => {
                    tracing::warn!("Provider {} failed for {}: {}", preference.label, purpose, e);
                }
            }
        }
        tracing::warn!("All providers failed for {}", purpose);
        None
    }

    /// Answer generation with per-model backoff, then the secondary provider
    pub async fn generate(&self, messages: &[ChatMessage], purpose: &str) -> Option<Completion> {
        let attempts = self.retry.attempts.max(1);

        for preference in &self.chain {
            for attempt in 0..attempts {
                match self.call(preference, messages).await {
                    CallOutcome::Success(response) => {
                        tracing::info!(
                            "{} generated by {} (attempt {}/{})",
                            purpose,
                            preference.label,
                            attempt + 1,
                            attempts
                        );
                        return Some(Self::completion(preference, response));
                    }
                    CallOutcome::RateLimited(e) if attempt + 1 < attempts => {
                        let delay = self.retry.next_delay(attempt);
                        tracing::warn!(
                            "{} rate limited ({}), retrying in {:.2}s (attempt {}/{})",
                            preference.label,
                            e,
                            delay.as_secs_f64(),
                            attempt + 1,
                            attempts
                        );
                        tokio::time::sleep(delay).await;
                    }
                    CallOutcome::RateLimited(_) => {
                        tracing::warn!(
                            "{} still rate limited after {} attempts, trying next model",
                            preference.label,
                            attempts
                        );
                        break;
                    }
                    CallOutcome::Empty => {
                        tracing::warn!("{} returned empty output, trying next model", preference.label);
                        break;
                    }
                    CallOutcome::Failed(e) => {
                        tracing::warn!("{} failed: {}, trying next model", preference.label, e);
                        break;
                    }
                }
            }
        }

        self.generate_secondary(messages, purpose).await
    }

    async fn generate_secondary(&self, messages: &[ChatMessage], purpose: &str) -> Option<Completion> {
        let secondary = self.secondary.as_ref()?;
        let label = secondary.label();
        tracing::info!("Provider chain exhausted, trying {} for {}", label, purpose);

        let call = secondary.client.complete(messages, Some(&secondary.model));
        match tokio::time::timeout(secondary.timeout, call).await {
            Ok(Ok(content)) if !content.trim().is_empty() => Some(Completion {
                content: content.trim().to_string(),
                label,
            }),
            Ok(Ok(_)) => {
                tracing::warn!("{} returned empty output", label);
                None
            }
            Ok(Err(e)) => {
                tracing::error!("{} failed: {}", label, e);
                None
            }
            Err(_) => {
                tracing::error!("{} timed out after {:?}", label, secondary.timeout);
                None
            }
        }
    }
}
