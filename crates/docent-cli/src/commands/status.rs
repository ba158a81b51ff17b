//! Status command

use super::open_store;
use crate::app::OutputFormat;
use anyhow::Result;
use docent_core::Config;
use serde_json::json;

pub async fn run(config: &Config, format: OutputFormat) -> Result<()> {
    let store = open_store(config)?;
    let chunks = store.count().await?;

    match format {
        OutputFormat::Json => {
            let status = json!({
                "store": config.store.path,
                "collection": config.store.collection,
                "chunks": chunks,
                "embedder": config.store.embedder,
                "embedding_dimensions": config.store.embedding_dimensions,
                "providers": config.llm.providers.keys().collect::<Vec<_>>(),
                "secondary": config.secondary.enabled.then(|| &config.secondary.model),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        OutputFormat::Text => {
            println!("Store:           {}", config.store.path.display());
            println!("Collection:      {}", config.store.collection);
            println!("Chunks:          {}", chunks);
            println!();
            println!("Embeddings:");
            println!("  Embedder:      {:?}", config.store.embedder);
            println!("  Dimensions:    {}", config.store.embedding_dimensions);
            println!();
            println!("Providers:");
            for (name, endpoint) in &config.llm.providers {
                let key = if endpoint.api_key.is_some() { "key set" } else { "no key" };
                println!("  {:<14} {} ({})", name, endpoint.model, key);
            }
            if config.secondary.enabled {
                println!("  {:<14} {} (secondary)", "ollama", config.secondary.model);
            }
        }
    }
    Ok(())
}
