//! Docent CLI
//!
//! Answer employee questions from internal policy and ops documents.

use clap::Parser;
use docent_core::error::exit_codes;
use docent_core::{Config, DocentError};

mod app;
mod commands;

use app::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<DocentError>()
                .map(DocentError::exit_code)
                .unwrap_or(exit_codes::GENERAL_ERROR)
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = Config::load()?;

    match cli.command {
        Commands::Ask(args) => commands::ask::run(args, &config, cli.format).await,
        Commands::Ingest(args) => commands::ingest::run(args, &config, cli.format)
            .await
            .map(|_| exit_codes::SUCCESS),
        Commands::Remove(args) => commands::remove::run(args, &config, cli.format)
            .await
            .map(|_| exit_codes::SUCCESS),
        Commands::Reset(args) => commands::reset::run(args, &config)
            .await
            .map(|_| exit_codes::SUCCESS),
        Commands::Status => commands::status::run(&config, cli.format)
            .await
            .map(|_| exit_codes::SUCCESS),
        Commands::Chain => commands::chain::run(&config, cli.format)
            .await
            .map(|_| exit_codes::SUCCESS),
    }
}
