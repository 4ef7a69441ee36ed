//! Sort command implementation.

use super::delete::confirm_deletion;
use super::{confirm, describe_failure, RunPaths};
use crate::cleanup::delete_source;
use crate::config::SorterConfig;
use crate::copier::{CancelToken, CopyOutcome, DuplicateCheck};
use crate::events::RunEvent;
use crate::pipeline::{analyze, spawn_run, BackupRun};
use crate::report::RunSummary;
use crate::runlog::RunLog;
use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.blue} {pos}/{len} {msg}";

/// Arguments for the sort command
#[derive(Args, Debug)]
pub struct SortArgs {
    #[command(flatten)]
    pub paths: RunPaths,

    /// Compare contents with BLAKE3 when a same-size file already exists
    #[arg(long)]
    pub verify_content: bool,

    /// Write a checkpoint line to the run log every N files
    #[arg(long)]
    pub checkpoint_interval: Option<usize>,

    /// Do not write a run log into the backup folder
    #[arg(long)]
    pub no_run_log: bool,

    /// Offer to delete the source folder after a clean run
    #[arg(long)]
    pub delete_source: bool,

    /// Start copying without asking
    #[arg(long)]
    pub yes: bool,
}

impl SortArgs {
    fn apply(&self, config: &mut SorterConfig) {
        self.paths.apply(config);
        if self.verify_content {
            config.duplicate_check = DuplicateCheck::Content;
        }
        if let Some(interval) = self.checkpoint_interval {
            config.checkpoint_interval = interval;
        }
        if self.no_run_log {
            config.run_log = false;
        }
    }
}

/// Run the sort command
pub async fn run(args: SortArgs, mut config: SorterConfig) -> Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let source = &args.paths.source;
    let destination = &args.paths.destination;

    let analysis = analyze(&config, source, destination)
        .map_err(|e| describe_failure(e, source))?;
    print!("{}", analysis.render_preview());

    if !args.yes && !confirm("\nStart copying?")? {
        println!("Cancelled");
        return Ok(());
    }

    let run = BackupRun::new(config.clone(), source, destination);
    let interrupt = listen_for_interrupt(run.cancel_token());
    let (handle, mut events) = spawn_run(run);

    let bar = ProgressBar::new(analysis.total_files() as u64);
    bar.set_style(ProgressStyle::with_template(PROGRESS_TEMPLATE)?);

    let mut run_log: Option<RunLog> = None;
    let mut collected = None;
    while let Some(event) = events.recv().await {
        match &event {
            RunEvent::Collected { total } => {
                bar.set_length(*total as u64);
                collected = Some(*total);
            }
            RunEvent::LayoutReady { backup_root, .. } if config.run_log => {
                match RunLog::create(backup_root) {
                    Ok(log) => {
                        log.begin(source, destination);
                        if let Some(total) = collected {
                            log.record(&RunEvent::Collected { total });
                        }
                        run_log = Some(log);
                    }
                    Err(e) => warn!("Could not create run log in {}: {}", backup_root.display(), e),
                }
            }
            RunEvent::Progress { index, .. } => bar.set_position(*index as u64),
            RunEvent::FileOutcome {
                file,
                outcome: CopyOutcome::Failed { reason },
            } => {
                bar.println(format!("Error copying {}: {}", file.path.display(), reason));
            }
            _ => {}
        }

        if let Some(log) = &run_log {
            log.record(&event);
        }
    }
    bar.finish_and_clear();

    let summary = handle.await.context("Backup worker stopped unexpectedly");
    interrupt.abort();
    let summary = summary??;
    print_summary(&summary);

    if let Some(log) = &run_log {
        println!("Log file: {}", log.path().display());
    }
    if config.write_report {
        match summary.write_json().await {
            Ok(path) => println!("Report: {}", path.display()),
            Err(e) => warn!("Failed to write JSON report: {}", e),
        }
    }

    if args.delete_source {
        // the signal handler stays installed, so Ctrl-C has to exit explicitly
        let exit_listener = exit_on_interrupt();
        let offered = offer_deletion(&summary);
        exit_listener.abort();
        offered?;
    }

    Ok(())
}

/// Cancel the run on Ctrl-C. Abort the returned task once the run is over.
fn listen_for_interrupt(cancel: CancelToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current file");
            cancel.cancel();
        }
    })
}

/// Terminate the process on Ctrl-C, for the interactive prompts after a run
fn exit_on_interrupt() -> JoinHandle<()> {
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nInterrupted, original folder kept.");
            std::process::exit(130);
        }
    })
}

fn print_summary(summary: &RunSummary) {
    println!("\n{}", if summary.cancelled { "Sorting Cancelled" } else { "Sorting Complete!" });
    println!("{}", "=".repeat(50));
    print!("{}", summary.render_text());
    println!("Backup location: {}", summary.backup_root.display());

    if !summary.failures.is_empty() {
        println!("\nFailed files:");
        for failure in &summary.failures {
            println!("  {}: {}", failure.path.display(), failure.reason);
        }
    }
}

fn offer_deletion(summary: &RunSummary) -> Result<()> {
    if summary.cancelled || summary.stats.failed > 0 {
        println!(
            "\nSource folder kept: the run did not finish cleanly ({} failed files)",
            summary.stats.failed
        );
        return Ok(());
    }

    println!();
    if !confirm_deletion(&summary.source_root)? {
        println!("Original folder kept.");
        return Ok(());
    }

    delete_source(&summary.source_root)
        .with_context(|| format!("Error deleting {}", summary.source_root.display()))?;
    info!("Source folder removed after backup");
    println!("Original folder deleted successfully.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn args() -> SortArgs {
        SortArgs {
            paths: RunPaths {
                source: PathBuf::from("/photos"),
                destination: PathBuf::from("/backup"),
                unknown_bucket: false,
            },
            verify_content: false,
            checkpoint_interval: None,
            no_run_log: false,
            delete_source: false,
            yes: false,
        }
    }

    #[test]
    fn test_flags_override_config() {
        let args = SortArgs {
            verify_content: true,
            checkpoint_interval: Some(5),
            no_run_log: true,
            ..args()
        };
        let mut config = SorterConfig::default();
        args.apply(&mut config);

        assert_eq!(config.duplicate_check, DuplicateCheck::Content);
        assert_eq!(config.checkpoint_interval, 5);
        assert!(!config.run_log);
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let mut config = SorterConfig {
            checkpoint_interval: 42,
            duplicate_check: DuplicateCheck::Content,
            ..SorterConfig::default()
        };
        args().apply(&mut config);

        assert_eq!(config.checkpoint_interval, 42);
        assert_eq!(config.duplicate_check, DuplicateCheck::Content);
        assert!(config.run_log);
    }

    #[tokio::test]
    async fn test_interrupt_listener_stops_when_aborted() {
        let cancel = CancelToken::new();
        let listener = listen_for_interrupt(cancel.clone());

        listener.abort();
        let err = listener.await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_progress_template_is_valid() {
        assert!(ProgressStyle::with_template(PROGRESS_TEMPLATE).is_ok());
    }
}
