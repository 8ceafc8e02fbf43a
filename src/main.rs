//! nova-ingest - incremental removable-volume ingestion
//!
//! Main binary entry point for the command-line interface.

use anyhow::Context;
use clap::Parser;
use nova_ingest::cli::{Cli, Commands};
use nova_ingest::config::Config;
use nova_ingest::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.log_file {
        Some(path) => logging::init_file_logging(path, cli.verbose)?,
        None => logging::init_logging(cli.verbose)?,
    }

    let config = Config::load(&cli.config)
        .with_context(|| format!("Cannot start without a valid config ({})", cli.config.display()))?;

    match cli.command {
        Commands::Ingest(args) => nova_ingest::cli::ingest::run(args, config).await,
        Commands::Scan(args) => nova_ingest::cli::scan::run(args, config).await,
        Commands::Manifest(args) => nova_ingest::cli::manifest::run(args, config).await,
        Commands::Recover(args) => nova_ingest::cli::recover::run(args, config).await,
    }
}
