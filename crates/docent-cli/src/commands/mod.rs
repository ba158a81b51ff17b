//! CLI command handlers

pub mod ask;
pub mod chain;
pub mod ingest;
pub mod remove;
pub mod reset;
pub mod status;

use anyhow::Result;
use docent_core::embed::embedder_from_config;
use docent_core::{Config, SqliteVectorStore, VectorStore};
use std::sync::Arc;

/// Open the configured vector store
pub fn open_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let embedder = embedder_from_config(&config.store)?;
    let store = SqliteVectorStore::open(&config.store.path, &config.store.collection, embedder)?;
    Ok(Arc::new(store))
}
