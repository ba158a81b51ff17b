//! Ask command

use super::open_store;
use crate::app::{AskArgs, OutputFormat};
use anyhow::Result;
use docent_core::error::exit_codes;
use docent_core::llm::gateway_from_config;
use docent_core::{
    Config, EvidenceItem, PipelineOptions, RagPipeline, RunOutcome, RunRequest, ToolRegistry,
    ToolRunOutcome,
};
use std::sync::Arc;

pub async fn run(args: AskArgs, config: &Config, format: OutputFormat) -> Result<i32> {
    let question = args.question.join(" ");
    if question.trim().is_empty() {
        return Err(docent_core::DocentError::InvalidInput("question must not be empty".into()).into());
    }

    let store = open_store(config)?;
    let gateway = if args.no_llm {
        None
    } else {
        Some(Arc::new(gateway_from_config(config)?))
    };

    let pipeline = RagPipeline::new(
        gateway,
        ToolRegistry::standard(store),
        PipelineOptions::from(&config.pipeline),
    );

    let request = RunRequest::new(question, args.user)
        .with_top_k(args.top_k.unwrap_or(config.pipeline.top_k))
        .with_rewrite(args.rewrite);
    let outcome = pipeline.run(request).await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text => print_text(&outcome, args.show_evidence),
    }

    Ok(if outcome.is_answered() {
        exit_codes::SUCCESS
    } else {
        exit_codes::NO_ANSWER
    })
}

fn print_text(outcome: &RunOutcome, show_evidence: bool) {
    match outcome {
        RunOutcome::Answered(result) => {
            println!("{}", result.response);
            if show_evidence {
                println!();
                println!(
                    "Provider: {} ({})",
                    result.provider_used,
                    result
                        .answer_mode()
                        .map(|m| m.as_str())
                        .unwrap_or("unknown")
                );
                print_evidence(&result.evidence);
            }
        }
        RunOutcome::NoAnswer(no_answer) => {
            eprintln!("No answer ({})", no_answer.error);
            if !no_answer.metadata.suggestions.is_empty() {
                println!("You could try:");
                for suggestion in &no_answer.metadata.suggestions {
                    println!("  - {}", suggestion);
                }
            }
        }
    }

    if show_evidence {
        println!();
        println!("Tool runs:");
        for run in &outcome.metadata().tool_runs {
            match &run.outcome {
                ToolRunOutcome::ResultCount(n) => {
                    println!("  {:<12} {:>3} results  {}", run.tool, n, run.query)
                }
                ToolRunOutcome::Error(e) => println!("  {:<12} error: {}", run.tool, e),
            }
        }
    }
}

fn print_evidence(evidence: &[EvidenceItem]) {
    println!("Evidence:");
    for (i, item) in evidence.iter().enumerate() {
        println!(
            "  {:>2}. [{}] {} (distance {:.3})",
            i + 1,
            item.bucket_key(),
            item.header(&format!("Document {}", i + 1)),
            item.distance()
        );
    }
}
