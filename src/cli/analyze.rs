//! Analyze command implementation.

use super::{describe_failure, RunPaths};
use crate::config::SorterConfig;
use crate::pipeline::analyze;
use anyhow::Result;
use clap::Args;

/// Arguments for the analyze command
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub paths: RunPaths,
}

/// Run the analyze command
pub async fn run(args: AnalyzeArgs, mut config: SorterConfig) -> Result<()> {
    args.paths.apply(&mut config);

    let analysis = analyze(&config, &args.paths.source, &args.paths.destination)
        .map_err(|e| describe_failure(e, &args.paths.source))?;

    print!("{}", analysis.render_preview());
    println!("\nReady to sort. Run `photo-year-backup sort` with the same paths to continue.");
    Ok(())
}
