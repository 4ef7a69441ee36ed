//! photo-year-backup
//!
//! Main binary entry point for the command-line interface.

use anyhow::{Context, Result};
use clap::Parser;
use photo_year_backup::cli::{self, Cli, Commands};
use photo_year_backup::config::SorterConfig;
use photo_year_backup::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.log_format);

    let config = match &cli.config {
        Some(path) => SorterConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SorterConfig::load().context("Failed to load config")?,
    };

    match cli.command {
        Commands::Analyze(args) => cli::analyze::run(args, config).await,
        Commands::Sort(args) => cli::sort::run(args, config).await,
        Commands::DeleteSource(args) => cli::delete::run(args).await,
    }
}
