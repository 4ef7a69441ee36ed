//! Run statistics and summary reporting.
//!
//! The reporter owns the counters for a run. Once the run ends it hands out an
//! immutable [`RunSummary`] that the presentation layer renders as console
//! text, a log section or a JSON report.

use crate::classify::BucketKey;
use crate::collect::SourceFile;
use crate::copier::CopyOutcome;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Name of the directory inside the backup root that holds JSON reports
pub const REPORTS_DIR_NAME: &str = "reports";

/// Counters accumulated over a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Files processed
    pub total: usize,
    /// Plain copies
    pub copied: usize,
    /// Copies written under a new name
    pub renamed: usize,
    pub skipped_identical: usize,
    pub failed: usize,
    /// Buckets that received at least one copy
    pub buckets_touched: BTreeSet<BucketKey>,
}

impl RunStats {
    pub fn record(&mut self, bucket: &BucketKey, outcome: &CopyOutcome) {
        self.total += 1;
        match outcome {
            CopyOutcome::Copied { .. } => self.copied += 1,
            CopyOutcome::CopiedRenamed { .. } => self.renamed += 1,
            CopyOutcome::SkippedIdentical { .. } => self.skipped_identical += 1,
            CopyOutcome::Failed { .. } => self.failed += 1,
        }
        if outcome.is_copy() {
            self.buckets_touched.insert(bucket.clone());
        }
    }

    /// Files written, renamed copies included
    pub fn copied_total(&self) -> usize {
        self.copied + self.renamed
    }

    /// Share of processed files that were written, 0.0 for an empty run
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.copied_total() as f64 / self.total as f64
        }
    }
}

/// A file that could not be backed up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub bucket: BucketKey,
    pub reason: String,
}

/// Final, read-only result of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source_root: PathBuf,
    pub backup_root: PathBuf,
    /// Files collected before copying started
    pub planned: usize,
    pub stats: RunStats,
    pub success_rate: f64,
    pub cancelled: bool,
    pub failures: Vec<FileFailure>,
    /// File count per year directory of the backup root after the run
    pub folder_structure: BTreeMap<String, usize>,
}

impl RunSummary {
    /// Years that received copies, sorted
    pub fn years_processed(&self) -> Vec<&str> {
        self.stats
            .buckets_touched
            .iter()
            .map(BucketKey::dir_name)
            .collect()
    }

    /// Write `reports/report-<run id>.json` under the backup root
    pub async fn write_json(&self) -> Result<PathBuf> {
        let reports_dir = self.backup_root.join(REPORTS_DIR_NAME);
        fs::create_dir_all(&reports_dir).await?;

        let json_path = reports_dir.join(format!("report-{}.json", self.run_id));
        let json_content = serde_json::to_string_pretty(self)?;
        fs::write(&json_path, json_content).await?;

        Ok(json_path)
    }

    /// Human-readable summary block
    pub fn render_text(&self) -> String {
        let stats = &self.stats;
        let mut text = String::new();
        text.push_str(&format!("Total files processed: {}\n", stats.total));
        text.push_str(&format!("Files copied: {}\n", stats.copied_total()));
        if stats.renamed > 0 {
            text.push_str(&format!("  of which renamed: {}\n", stats.renamed));
        }
        text.push_str(&format!(
            "Files skipped (already exist): {}\n",
            stats.skipped_identical
        ));
        text.push_str(&format!("Failed copies: {}\n", stats.failed));
        text.push_str(&format!("Success rate: {:.1}%\n", self.success_rate * 100.0));
        text.push_str(&format!("Years processed: {}\n", self.years_processed().join(", ")));
        if self.cancelled {
            text.push_str(&format!(
                "Run cancelled: {} of {} files were not processed\n",
                self.planned.saturating_sub(stats.total),
                self.planned
            ));
        }
        text
    }
}

/// Accumulates outcomes while a run is in progress
#[derive(Debug)]
pub struct RunReporter {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    source_root: PathBuf,
    backup_root: PathBuf,
    planned: usize,
    stats: RunStats,
    failures: Vec<FileFailure>,
    cancelled: bool,
}

impl RunReporter {
    pub fn new(source_root: &Path, backup_root: &Path, planned: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            source_root: source_root.to_path_buf(),
            backup_root: backup_root.to_path_buf(),
            planned,
            stats: RunStats::default(),
            failures: Vec::new(),
            cancelled: false,
        }
    }

    pub fn record(&mut self, file: &SourceFile, outcome: &CopyOutcome) {
        self.stats.record(&file.bucket, outcome);
        if let CopyOutcome::Failed { reason } = outcome {
            self.failures.push(FileFailure {
                path: file.path.clone(),
                bucket: file.bucket.clone(),
                reason: reason.clone(),
            });
        }
    }

    /// Count an entry the collector could not read as a failed file
    pub fn record_unreadable(&mut self, failure: FileFailure) {
        self.stats.record(
            &failure.bucket,
            &CopyOutcome::Failed {
                reason: failure.reason.clone(),
            },
        );
        self.failures.push(failure);
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn finish(self, folder_structure: BTreeMap<String, usize>) -> RunSummary {
        let success_rate = self.stats.success_rate();
        RunSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            source_root: self.source_root,
            backup_root: self.backup_root,
            planned: self.planned,
            stats: self.stats,
            success_rate,
            cancelled: self.cancelled,
            failures: self.failures,
            folder_structure,
        }
    }
}

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
