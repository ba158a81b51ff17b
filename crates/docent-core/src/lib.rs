//! Docent Core Library
//!
//! Retrieval-augmented answering over internal documents.
//!
//! # Features
//! - SQLite vector store with cosine search and metadata filters
//! - Category-scoped retrieval tools run concurrently
//! - LLM query rewriting, intent routing and per-category query splitting
//! - Fair, distance-ordered evidence prioritization with deduplicated citations
//! - Multi-provider generation with backoff, fallback chain and a local secondary model

pub mod config;
pub mod conversation;
pub mod embed;
pub mod error;
pub mod evidence;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod planner;
pub mod query;
pub mod store;
pub mod synth;
pub mod tools;

pub use config::{Config, LlmConfig, PipelineConfig, RetryConfig, SecondaryConfig, StoreConfig};
pub use conversation::{
    ChatReply, ChatService, ConversationStore, InMemoryConversationStore, StoredMessage,
};
pub use embed::{Embedder, HashEmbedder, HttpEmbedder};
pub use error::{DocentError, Error, Result};
pub use evidence::{
    build_citations, prioritize, EvidenceItem, PrioritizeOptions, ToolRun, ToolRunOutcome,
};
pub use ingest::{chunk_text, Chunk, DocumentIndexer, DocumentInput, IndexReport};
pub use llm::{
    ChatBackend, ChatMessage, ChatResponse, Completion, ProviderGateway, ProviderPreference,
    ProviderRouter, RetryPolicy,
};
pub use pipeline::{
    NoAnswer, PipelineOptions, RagPipeline, RunMetadata, RunOutcome, RunRequest, RunResult,
};
pub use planner::{plan_tools, OPS_TOOL, POLICY_TOOL};
pub use query::{Intent, IntentFlags, Query, QueryPreprocessor};
pub use store::{MetadataFilter, ScoredItem, SqliteVectorStore, StoredItem, VectorStore};
pub use synth::{AnswerMode, AnswerSynthesizer, SynthOptions};
pub use tools::{CategoryLookupTool, RetrievalRequest, RetrievalTool, ToolOutput, ToolRegistry};

/// Default data directory name
pub const DATA_DIR_NAME: &str = "docent";

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "docent";
