//! Ingest command

use super::open_store;
use crate::app::{IngestArgs, OutputFormat};
use anyhow::{Context, Result};
use docent_core::{Config, DocumentIndexer, DocumentInput};

pub async fn run(args: IngestArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let store = open_store(config)?;
    let indexer = DocumentIndexer::new(store, config.store.batch_size);

    let mut reports = Vec::new();
    for path in &args.files {
        let input = DocumentInput::from_file(path, &args.document_type, args.uploaded_by.clone())
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let report = indexer.index_document(&input).await?;
        if format == OutputFormat::Text {
            println!(
                "Indexed {} as {} ({} chunks{})",
                report.filename,
                report.document_id,
                report.chunks,
                if report.replaced > 0 {
                    format!(", replaced {}", report.replaced)
                } else {
                    String::new()
                }
            );
        }
        reports.push(report);
    }

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    Ok(())
}
