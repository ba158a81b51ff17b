//! Remove command

use super::open_store;
use crate::app::{OutputFormat, RemoveArgs};
use anyhow::Result;
use docent_core::{Config, DocumentIndexer};

pub async fn run(args: RemoveArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let store = open_store(config)?;
    let removed = DocumentIndexer::new(store, config.store.batch_size)
        .remove_document(&args.document_id)
        .await;

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "document_id": args.document_id, "removed": removed })
        ),
        OutputFormat::Text if removed == 0 => {
            println!("No chunks found for document '{}'", args.document_id)
        }
        OutputFormat::Text => println!(
            "Removed {} chunks of document '{}'",
            removed, args.document_id
        ),
    }
    Ok(())
}
