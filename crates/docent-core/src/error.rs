//! Error types for docent

use thiserror::Error;

/// Result type alias using DocentError
pub type Result<T> = std::result::Result<T, DocentError>;

/// Error type alias for convenience
pub type Error = DocentError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NO_ANSWER: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
}

/// Main error type for docent
#[derive(Debug, Error)]
pub enum DocentError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Provider refused the call for quota or rate reasons (HTTP 429 and friends)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External service error: {0}")]
    ExternalError(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl DocentError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidInput(_) | Self::Config(_) => exit_codes::INVALID_INPUT,
            _ => exit_codes::GENERAL_ERROR,
        }
    }

    /// True for the typed rate-limit signal
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}
