//! Configuration management
//!
//! Configuration is read from `config.yml` under the user config directory when
//! present. Every field falls back to a `DOCENT_*` environment variable and then
//! to a built-in default, so a bare environment is enough to run.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// LLM providers and fallback chain
    #[serde(default)]
    pub llm: LlmConfig,

    /// Backoff policy for the answer-generation call
    #[serde(default)]
    pub retry: RetryConfig,

    /// OpenAI-compatible endpoint tried after the whole chain fails
    #[serde(default)]
    pub secondary: SecondaryConfig,

    /// Vector store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Pipeline tuning knobs
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Wire protocol spoken by a provider endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKind {
    /// Google Generative Language `generateContent`
    Gemini,
    /// `/v1/chat/completions` (OpenAI, DeepSeek, OpenRouter, Anthropic compat, Ollama, vLLM)
    OpenAi,
}

/// One reachable provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub api: ApiKind,

    /// Base URL (without the `/v1/...` suffix for OpenAI-compatible servers)
    pub url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Model used when a preference carries no override
    pub model: String,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Comma-separated fallback chain, e.g. `gemini:gemini-2.5-flash,openai:gpt-4o-mini`
    #[serde(default = "default_provider_chain")]
    pub provider_chain: Option<String>,

    /// Provider used by preferences that name none (`default`, `auto`)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Primary Gemini model, head of the default chain
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Registered endpoints keyed by provider name
    #[serde(default = "default_providers")]
    pub providers: BTreeMap<String, ProviderEndpoint>,

    /// Per-request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider_chain: default_provider_chain(),
            default_provider: default_provider(),
            gemini_model: default_gemini_model(),
            providers: default_providers(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_provider_chain() -> Option<String> {
    std::env::var("DOCENT_PROVIDER_CHAIN")
        .ok()
        .filter(|s| !s.trim().is_empty())
}

fn default_provider() -> String {
    std::env::var("DOCENT_DEFAULT_PROVIDER").unwrap_or_else(|_| "gemini".to_string())
}

fn default_gemini_model() -> String {
    std::env::var("DOCENT_GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string())
}

fn default_providers() -> BTreeMap<String, ProviderEndpoint> {
    let mut providers = BTreeMap::new();

    providers.insert(
        "gemini".to_string(),
        ProviderEndpoint {
            api: ApiKind::Gemini,
            url: std::env::var("DOCENT_GEMINI_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            api_key: std::env::var("GEMINI_API_KEY").ok(),
            model: default_gemini_model(),
        },
    );

    // OpenAI-compatible providers are only registered when a key is present
    let compat = [
        ("openai", "OPENAI_API_KEY", "https://api.openai.com", "gpt-4o-mini"),
        ("anthropic", "ANTHROPIC_API_KEY", "https://api.anthropic.com", "claude-3-5-haiku-latest"),
        ("deepseek", "DEEPSEEK_API_KEY", "https://api.deepseek.com", "deepseek-chat"),
        ("openrouter", "OPENROUTER_API_KEY", "https://openrouter.ai/api", "openai/gpt-4o-mini"),
    ];
    for (name, key_var, url, model) in compat {
        if let Ok(key) = std::env::var(key_var) {
            providers.insert(
                name.to_string(),
                ProviderEndpoint {
                    api: ApiKind::OpenAi,
                    url: url.to_string(),
                    api_key: Some(key),
                    model: model.to_string(),
                },
            );
        }
    }

    providers
}

fn default_llm_timeout() -> u64 {
    env_parse("DOCENT_LLM_TIMEOUT_SECS").unwrap_or(60)
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    4096
}

/// Backoff policy for rate-limited generation calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per model before moving on
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_secs: f64,

    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
        }
    }
}

fn default_retry_attempts() -> u32 {
    env_parse("DOCENT_RETRY_ATTEMPTS").unwrap_or(3)
}

fn default_base_delay() -> f64 {
    env_parse("DOCENT_RETRY_BASE_DELAY").unwrap_or(2.0)
}

fn default_max_delay() -> f64 {
    env_parse("DOCENT_RETRY_MAX_DELAY").unwrap_or(60.0)
}

/// Local OpenAI-compatible endpoint (Ollama by default)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondaryConfig {
    #[serde(default = "default_secondary_enabled")]
    pub enabled: bool,

    #[serde(default = "default_secondary_url")]
    pub url: String,

    #[serde(default = "default_secondary_key")]
    pub api_key: Option<String>,

    #[serde(default = "default_secondary_model")]
    pub model: String,

    #[serde(default = "default_secondary_timeout")]
    pub timeout_secs: u64,
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self {
            enabled: default_secondary_enabled(),
            url: default_secondary_url(),
            api_key: default_secondary_key(),
            model: default_secondary_model(),
            timeout_secs: default_secondary_timeout(),
        }
    }
}

fn default_secondary_enabled() -> bool {
    std::env::var("DOCENT_OLLAMA_ENABLED")
        .map(|v| parse_flag(&v))
        .unwrap_or(true)
}

fn default_secondary_url() -> String {
    std::env::var("DOCENT_OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string())
}

fn default_secondary_key() -> Option<String> {
    Some(std::env::var("DOCENT_OLLAMA_API_KEY").unwrap_or_else(|_| "ollama".to_string()))
}

fn default_secondary_model() -> String {
    std::env::var("DOCENT_OLLAMA_MODEL").unwrap_or_else(|_| "qwen2.5:7b".to_string())
}

fn default_secondary_timeout() -> u64 {
    60
}

/// Embedding backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Local feature hashing, no network
    Hash,
    /// `/v1/embeddings` on an OpenAI-compatible server
    Http,
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_embedder_kind")]
    pub embedder: EmbedderKind,

    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,

    #[serde(default)]
    pub embedding_url: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default)]
    pub embedding_api_key: Option<String>,

    /// Items per upsert batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            collection: default_collection(),
            embedder: default_embedder_kind(),
            embedding_dimensions: default_embedding_dimensions(),
            embedding_url: std::env::var("DOCENT_EMBEDDING_URL").ok(),
            embedding_model: default_embedding_model(),
            embedding_api_key: std::env::var("DOCENT_EMBEDDING_API_KEY").ok(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_store_path() -> PathBuf {
    std::env::var("DOCENT_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(crate::DATA_DIR_NAME)
                .join("vectors.sqlite")
        })
}

fn default_collection() -> String {
    "chatbot_documents".to_string()
}

fn default_embedder_kind() -> EmbedderKind {
    match std::env::var("DOCENT_EMBEDDER").as_deref() {
        Ok("http") => EmbedderKind::Http,
        _ => EmbedderKind::Hash,
    }
}

fn default_embedding_dimensions() -> usize {
    env_parse("DOCENT_EMBEDDING_DIMS").unwrap_or(384)
}

fn default_embedding_model() -> String {
    std::env::var("DOCENT_EMBEDDING_MODEL")
        .unwrap_or_else(|_| "paraphrase-multilingual-MiniLM-L12-v2".to_string())
}

fn default_batch_size() -> usize {
    32
}

/// Pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Results requested from each retrieval tool
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Queries with at most this many words are not rewritten
    #[serde(default = "default_rewrite_min_words")]
    pub rewrite_min_words: usize,

    /// Items guaranteed from every bucket before round-robin
    #[serde(default = "default_min_per_bucket")]
    pub min_per_bucket: usize,

    /// Hard cap on prioritized evidence
    #[serde(default = "default_max_total")]
    pub max_total: usize,

    /// Unique filenames listed in the citation block
    #[serde(default = "default_citation_limit")]
    pub citation_limit: usize,

    /// Excerpts per category sent to the summarizer
    #[serde(default = "default_excerpt_per_category")]
    pub excerpt_per_category: usize,

    /// Excerpts in total sent to the summarizer
    #[serde(default = "default_excerpt_total")]
    pub excerpt_total: usize,

    /// Characters kept per snippet in the deterministic answer
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,

    /// Wall-clock budget for one `run`
    #[serde(default = "default_deadline")]
    pub deadline_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            rewrite_min_words: default_rewrite_min_words(),
            min_per_bucket: default_min_per_bucket(),
            max_total: default_max_total(),
            citation_limit: default_citation_limit(),
            excerpt_per_category: default_excerpt_per_category(),
            excerpt_total: default_excerpt_total(),
            snippet_chars: default_snippet_chars(),
            deadline_secs: default_deadline(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_rewrite_min_words() -> usize {
    4
}
fn default_min_per_bucket() -> usize {
    3
}
fn default_max_total() -> usize {
    10
}
fn default_citation_limit() -> usize {
    3
}
fn default_excerpt_per_category() -> usize {
    2
}
fn default_excerpt_total() -> usize {
    4
}
fn default_snippet_chars() -> usize {
    500
}
fn default_deadline() -> Option<u64> {
    Some(env_parse("DOCENT_DEADLINE_SECS").unwrap_or(180))
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|s| s.trim().parse().ok())
}

/// Parse a boolean-ish environment value
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

impl Config {
    /// Load config from default path
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load config from an explicit path, defaults when the file is absent
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            tracing::debug!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        std::env::var("DOCENT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(crate::CONFIG_DIR_NAME)
                    .join("config.yml")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" on "));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
pipeline:
  top_k: 8
retry:
  attempts: 5
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.pipeline.top_k, 8);
        assert_eq!(config.pipeline.min_per_bucket, 3);
        assert_eq!(config.pipeline.max_total, 10);
        assert_eq!(config.retry.attempts, 5);
        assert!(config.llm.providers.contains_key("gemini"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("absent.yml")).unwrap();
        assert_eq!(config.store.collection, "chatbot_documents");
        assert_eq!(config.store.batch_size, 32);
    }
}
