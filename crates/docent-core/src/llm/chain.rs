//! Provider fallback chain
//!
//! The chain is parsed once at startup from a comma-separated string and never
//! changes afterwards. It is never empty.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Providers accepted in chain entries
pub const SUPPORTED_PROVIDERS: &[&str] = &[
    "anthropic",
    "deepseek",
    "gemini",
    "ollama",
    "openai",
    "openrouter",
];

/// Secondary defaults appended after the configured Gemini model
const DEFAULT_CHAIN_MODELS: &[&str] = &["gemini-2.0-flash", "gemini-1.5-pro-latest"];

const LAST_RESORT_MODEL: &str = "gemini-2.5-pro";

/// One entry in the fallback chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPreference {
    /// Provider name, `None` for the router's default
    pub provider: Option<String>,

    /// Human-readable label, reported when the backend names no provider
    pub label: String,

    /// Model override passed through to the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ProviderPreference {
    pub fn new(provider: Option<&str>, label: impl Into<String>, model: Option<&str>) -> Self {
        Self {
            provider: provider.map(str::to_string),
            label: label.into(),
            model: model.map(str::to_string),
        }
    }
}

/// Parse a single chain entry
///
/// Accepts `default`/`auto`, `provider:model`, a bare provider name, and the
/// `gemini-*` model shorthand. Anything else yields `None`.
pub fn parse_provider_entry(raw: &str) -> Option<ProviderPreference> {
    let token = raw.trim();
    if token.is_empty() {
        return None;
    }

    let normalized = token.to_ascii_lowercase();

    if normalized == "default" || normalized == "auto" {
        return Some(ProviderPreference::new(None, token, None));
    }

    if let Some((head, tail)) = token.split_once(':') {
        let provider = head.trim().to_ascii_lowercase();
        if SUPPORTED_PROVIDERS.contains(&provider.as_str()) {
            let model = tail.trim();
            let model = (!model.is_empty()).then_some(model);
            return Some(ProviderPreference::new(Some(&provider), token, model));
        }
    }

    if SUPPORTED_PROVIDERS.contains(&normalized.as_str()) {
        return Some(ProviderPreference::new(Some(&normalized), token, None));
    }

    if normalized.starts_with("gemini") {
        return Some(ProviderPreference::new(Some("gemini"), token, Some(token)));
    }

    tracing::warn!(
        "Provider chain entry '{}' is not recognized (supported: {}), skipping",
        token,
        SUPPORTED_PROVIDERS.join(", ")
    );
    None
}

/// Build the chain used when nothing usable is configured
pub fn default_chain(gemini_model: Option<&str>) -> Vec<ProviderPreference> {
    let mut seen = HashSet::new();
    let mut chain = Vec::new();

    let models = gemini_model
        .into_iter()
        .chain(DEFAULT_CHAIN_MODELS.iter().copied())
        .map(str::trim)
        .filter(|m| !m.is_empty());

    for model in models {
        if seen.insert(model.to_ascii_lowercase()) {
            chain.push(ProviderPreference::new(Some("gemini"), model, Some(model)));
        }
    }

    if chain.is_empty() {
        chain.push(ProviderPreference::new(
            Some("gemini"),
            LAST_RESORT_MODEL,
            None,
        ));
    }
    chain
}

/// Parse a configured chain, falling back to the default chain when empty
pub fn parse_chain(raw: Option<&str>, gemini_model: Option<&str>) -> Vec<ProviderPreference> {
    let parsed: Vec<ProviderPreference> = raw
        .unwrap_or_default()
        .split(',')
        .filter_map(parse_provider_entry)
        .collect();

    if parsed.is_empty() {
        let chain = default_chain(gemini_model);
        tracing::debug!(
            "Using default provider chain: {:?}",
            chain.iter().map(|p| p.label.as_str()).collect::<Vec<_>>()
        );
        chain
    } else {
        tracing::info!(
            "Using custom provider chain: {:?}",
            parsed.iter().map(|p| p.label.as_str()).collect::<Vec<_>>()
        );
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_forms() {
        let p = parse_provider_entry(" Auto ").unwrap();
        assert_eq!(p.provider, None);
        assert_eq!(p.label, "Auto");

        let p = parse_provider_entry("OpenAI:gpt-4o-mini").unwrap();
        assert_eq!(p.provider.as_deref(), Some("openai"));
        assert_eq!(p.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(p.label, "OpenAI:gpt-4o-mini");

        let p = parse_provider_entry("deepseek:").unwrap();
        assert_eq!(p.provider.as_deref(), Some("deepseek"));
        assert_eq!(p.model, None);

        let p = parse_provider_entry("anthropic").unwrap();
        assert_eq!(p.provider.as_deref(), Some("anthropic"));

        let p = parse_provider_entry("gemini-2.5-flash").unwrap();
        assert_eq!(p.provider.as_deref(), Some("gemini"));
        assert_eq!(p.model.as_deref(), Some("gemini-2.5-flash"));

        assert!(parse_provider_entry("mistral:large").is_none());
        assert!(parse_provider_entry("   ").is_none());
    }

    #[test]
    fn test_default_chain_dedupes_case_insensitively() {
        let chain = default_chain(Some("Gemini-2.0-Flash"));
        let labels: Vec<_> = chain.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Gemini-2.0-Flash", "gemini-1.5-pro-latest"]);
    }

    #[test]
    fn test_unusable_config_falls_back() {
        let chain = parse_chain(Some("bogus, ,nope"), Some("gemini-2.5-flash"));
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].model.as_deref(), Some("gemini-2.5-flash"));

        let chain = parse_chain(None, None);
        assert!(!chain.is_empty());
    }

    #[test]
    fn test_custom_chain_keeps_order() {
        let chain = parse_chain(Some("openai:gpt-4o,bogus,default"), None);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].provider.as_deref(), Some("openai"));
        assert_eq!(chain[1].provider, None);
    }
}
