//! Chain command

use crate::app::OutputFormat;
use anyhow::Result;
use docent_core::llm::parse_chain;
use docent_core::Config;

pub async fn run(config: &Config, format: OutputFormat) -> Result<()> {
    let chain = parse_chain(
        config.llm.provider_chain.as_deref(),
        Some(&config.llm.gemini_model),
    );

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&chain)?),
        OutputFormat::Text => {
            for (i, preference) in chain.iter().enumerate() {
                println!("{}. {}", i + 1, preference.label);
            }
            if config.secondary.enabled {
                println!("then ollama-{} (secondary)", config.secondary.model);
            }
        }
    }
    Ok(())
}
