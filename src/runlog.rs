//! Durable per-run log file written into the backup root.
//!
//! One file per run, named `photo_sort_log_<YYYYMMDD_HHMMSS>.log`. Entries are
//! ordinary tracing events dispatched to a dedicated `fmt` subscriber whose
//! writer is that file, one `timestamp - LEVEL - message` line per event.

use crate::copier::{CopyOutcome, NO_DESTINATION_BUCKET};
use crate::events::RunEvent;
use crate::report::RunSummary;
use crate::Result;
use chrono::Local;
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{dispatcher, error, info, warn, Dispatch, Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Target of every event written to the run log
pub const RUN_LOG_TARGET: &str = "run_log";

const RULE_WIDTH: usize = 60;

/// `2024-01-31 12:00:00 - INFO - message`
struct RunLogFormat;

impl<S, N> FormatEvent<S, N> for RunLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "{} - {} - ",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    dispatch: Dispatch,
}

impl RunLog {
    /// Create a new log file in `backup_root`
    pub fn create(backup_root: &Path) -> Result<Self> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = backup_root.join(format!("photo_sort_log_{}.log", timestamp));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let subscriber = tracing_subscriber::fmt()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_max_level(Level::INFO)
            .event_format(RunLogFormat)
            .finish();

        Ok(Self {
            path,
            dispatch: Dispatch::new(subscriber),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` with this log as the current subscriber
    fn scoped(&self, f: impl FnOnce()) {
        dispatcher::with_default(&self.dispatch, f);
    }

    /// Opening banner of a run
    pub fn begin(&self, source_root: &Path, destination_base: &Path) {
        self.scoped(|| {
            info!(target: RUN_LOG_TARGET, "Starting photo sorting process");
            info!(target: RUN_LOG_TARGET, "Source folder: {}", source_root.display());
            info!(target: RUN_LOG_TARGET, "Destination folder: {}", destination_base.display());
        });
    }

    /// Append the log lines for one run event
    pub fn record(&self, event: &RunEvent) {
        if let RunEvent::Complete { summary } = event {
            self.write_summary(summary);
            return;
        }

        self.scoped(|| match event {
            RunEvent::Collected { total } => {
                info!(target: RUN_LOG_TARGET, "Found {} files to process", total);
            }
            RunEvent::LayoutReady {
                backup_root,
                buckets,
            } => {
                let names: Vec<&str> = buckets.iter().map(|b| b.dir_name()).collect();
                info!(target: RUN_LOG_TARGET, "Backup folder: {}", backup_root.display());
                info!(target: RUN_LOG_TARGET, "Verified year folders: {}", names.join(", "));
                info!(target: RUN_LOG_TARGET, "Starting file copy process...");
            }
            RunEvent::Checkpoint { index, total } => {
                info!(target: RUN_LOG_TARGET, "Copied {}/{} files...", index, total);
            }
            RunEvent::FileOutcome {
                file,
                outcome: CopyOutcome::Failed { reason },
            } => {
                if reason == NO_DESTINATION_BUCKET {
                    warn!(target: RUN_LOG_TARGET, "No destination folder for {}, skipping {}", file.bucket, file.path.display());
                } else {
                    error!(target: RUN_LOG_TARGET, "Error copying {}: {}", file.path.display(), reason);
                }
            }
            _ => {}
        });
    }

    /// Detailed summary followed by the final folder structure
    pub fn write_summary(&self, summary: &RunSummary) {
        let rule = "=".repeat(RULE_WIDTH);
        let stats = &summary.stats;

        self.scoped(|| {
            info!(target: RUN_LOG_TARGET, "{}", rule);
            info!(target: RUN_LOG_TARGET, "DETAILED SUMMARY");
            info!(target: RUN_LOG_TARGET, "{}", rule);
            info!(
                target: RUN_LOG_TARGET,
                "Operation completed at: {}",
                summary.finished_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            );
            info!(target: RUN_LOG_TARGET, "Source folder: {}", summary.source_root.display());
            info!(target: RUN_LOG_TARGET, "Backup folder: {}", summary.backup_root.display());
            info!(target: RUN_LOG_TARGET, "Total files found: {}", summary.planned);
            info!(target: RUN_LOG_TARGET, "Files successfully copied: {}", stats.copied_total());
            info!(target: RUN_LOG_TARGET, "Files renamed on copy: {}", stats.renamed);
            info!(target: RUN_LOG_TARGET, "Files skipped (duplicates): {}", stats.skipped_identical);
            info!(target: RUN_LOG_TARGET, "Failed file copies: {}", stats.failed);
            info!(target: RUN_LOG_TARGET, "Success rate: {:.1}%", summary.success_rate * 100.0);
            info!(target: RUN_LOG_TARGET, "Years processed: {}", summary.years_processed().join(", "));
            for failure in &summary.failures {
                error!(target: RUN_LOG_TARGET, "Failed: {}: {}", failure.path.display(), failure.reason);
            }
            if summary.cancelled {
                warn!(
                    target: RUN_LOG_TARGET,
                    "Run cancelled after {} of {} files", stats.total, summary.planned
                );
            }

            info!(target: RUN_LOG_TARGET, "FINAL FOLDER STRUCTURE:");
            for (year, count) in &summary.folder_structure {
                info!(target: RUN_LOG_TARGET, "  {}/: {} files", year, count);
            }
        });
    }
}
