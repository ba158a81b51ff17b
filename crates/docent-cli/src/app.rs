//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docent")]
#[command(
    author,
    version,
    about = "Answer employee questions from internal policy and ops documents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a question
    Ask(AskArgs),

    /// Index text or markdown documents
    Ingest(IngestArgs),

    /// Remove an indexed document
    #[command(alias = "rm")]
    Remove(RemoveArgs),

    /// Drop every indexed chunk
    Reset(ResetArgs),

    /// Show store status
    Status,

    /// Print the resolved provider fallback chain
    Chain,
}

#[derive(Args)]
pub struct AskArgs {
    /// Question text
    #[arg(required = true)]
    pub question: Vec<String>,

    /// Results per retrieval tool
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Normalize the question with a model before routing
    #[arg(long)]
    pub rewrite: bool,

    /// Skip every model call and answer from snippets
    #[arg(long)]
    pub no_llm: bool,

    /// Name recorded as the requester
    #[arg(long, env = "USER", default_value = "cli")]
    pub user: String,

    /// Print evidence and tool diagnostics
    #[arg(long)]
    pub show_evidence: bool,
}

#[derive(Args)]
pub struct IngestArgs {
    /// Files to index
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Document category, e.g. `policy` or `ops`
    #[arg(short = 't', long = "type")]
    pub document_type: String,

    /// Uploader recorded in chunk metadata
    #[arg(long)]
    pub uploaded_by: Option<String>,
}

#[derive(Args)]
pub struct RemoveArgs {
    /// Document id printed by `ingest`
    pub document_id: String,
}

#[derive(Args)]
pub struct ResetArgs {
    /// Confirm deletion
    #[arg(long)]
    pub yes: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
