//! Analysis and execution of a full backup run.
//!
//! A run is collect, then prepare the layout, then copy, then report. All
//! pre-flight checks happen before anything is written under the destination.

use crate::classify::{BucketKey, YearClassifier};
use crate::collect::{Collection, TreeCollector};
use crate::config::SorterConfig;
use crate::copier::{CancelToken, Completion, ReconcilingCopier};
use crate::events::{ChannelProgress, CopyProgress, RunEvent};
use crate::layout::{folder_structure, BackupLayout, LayoutInspection};
use crate::report::{format_bytes, RunReporter, RunSummary};
use crate::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, span, warn, Level};

/// Pre-flight view of a run, shown to the operator before copying
#[derive(Debug, Clone)]
pub struct Analysis {
    pub destination_base: PathBuf,
    pub collection: Collection,
    pub inspection: LayoutInspection,
}

impl Analysis {
    pub fn total_files(&self) -> usize {
        self.collection.files.len()
    }

    pub fn render_preview(&self) -> String {
        let collection = &self.collection;
        let mut text = String::new();

        text.push_str("Analysis Results:\n");
        text.push_str(&format!("{}\n\n", "=".repeat(50)));
        text.push_str(&format!("Source Folder: {}\n", collection.source_root.display()));
        text.push_str(&format!("Destination: {}\n\n", self.destination_base.display()));
        text.push_str(&format!("Found {} subfolders\n", collection.subfolders.len()));
        text.push_str(&format!("Years identified: {}\n", collection.years().join(", ")));
        let excluded: Vec<&str> = collection
            .excluded_subfolders()
            .map(|s| s.name.as_str())
            .collect();
        if !excluded.is_empty() {
            text.push_str(&format!("Excluded subfolders: {}\n", excluded.join(", ")));
        }
        text.push_str(&format!(
            "Total files to process: {} ({})\n",
            self.total_files(),
            format_bytes(collection.total_bytes())
        ));
        if !collection.unreadable.is_empty() {
            text.push_str(&format!(
                "Unreadable entries (counted as failed): {}\n",
                collection.unreadable.len()
            ));
        }

        text.push_str("\nFiles by year:\n");
        for (bucket, count) in collection.files_per_bucket() {
            text.push_str(&format!("  {}: {} files\n", bucket, count));
        }

        let inspection = &self.inspection;
        text.push_str("\nBackup folder status:\n");
        if inspection.root_exists {
            text.push_str(&format!(
                "  Existing backup folder found: {}\n",
                inspection.backup_root.display()
            ));
            if inspection.existing_years.is_empty() {
                text.push_str("  New year folders will be created\n");
            } else {
                text.push_str(&format!(
                    "  Existing year folders: {}\n",
                    inspection.existing_years.join(", ")
                ));
                text.push_str("  Files will be added to existing year folders\n");
            }
        } else {
            text.push_str(&format!(
                "  New backup folder will be created: {}\n",
                inspection.backup_root.display()
            ));
        }

        text
    }
}

/// Collect the source and inspect the destination without writing anything
pub fn analyze(config: &SorterConfig, source_root: &Path, destination_base: &Path) -> Result<Analysis> {
    let collector = TreeCollector::new(YearClassifier::new(config.unknown_bucket_enabled));
    let collection = collector.collect(source_root)?;
    let inspection = LayoutInspection::inspect(destination_base, &config.backup_dir_name)?;

    Ok(Analysis {
        destination_base: destination_base.to_path_buf(),
        collection,
        inspection,
    })
}

/// One backup run from a source root into a destination base
#[derive(Debug, Clone)]
pub struct BackupRun {
    config: SorterConfig,
    source_root: PathBuf,
    destination_base: PathBuf,
    cancel: CancelToken,
}

impl BackupRun {
    pub fn new(config: SorterConfig, source_root: &Path, destination_base: &Path) -> Self {
        Self {
            config,
            source_root: source_root.to_path_buf(),
            destination_base: destination_base.to_path_buf(),
            cancel: CancelToken::new(),
        }
    }

    /// Token that stops the run before the next file
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run to completion on the current thread.
    ///
    /// Fails only on pre-flight conditions. Per-file failures end up in the
    /// summary.
    pub fn execute<P>(&self, progress: &mut P) -> Result<RunSummary>
    where
        P: CopyProgress + ?Sized,
    {
        let span = span!(Level::INFO, "backup_run", source = %self.source_root.display());
        let _enter = span.enter();

        info!(
            "Starting photo sorting: {} -> {}",
            self.source_root.display(),
            self.destination_base.display()
        );

        let collector = TreeCollector::new(YearClassifier::new(self.config.unknown_bucket_enabled));
        let collection = collector.collect(&self.source_root)?;
        progress.on_collected(collection.files.len());

        let buckets = collection.buckets();
        let layout = BackupLayout::prepare(&self.destination_base, &self.config.backup_dir_name, &buckets)?;
        let bucket_list: Vec<BucketKey> = layout.buckets().cloned().collect();
        progress.on_layout_ready(layout.root(), &bucket_list);

        let copier = ReconcilingCopier::new()
            .with_duplicate_check(self.config.duplicate_check)
            .with_checkpoint_interval(self.config.checkpoint_interval)
            .with_cancel_token(self.cancel.clone());

        let planned = collection.files.len() + collection.unreadable.len();
        let mut reporter = RunReporter::new(&self.source_root, layout.root(), planned);
        for failure in collection.unreadable {
            reporter.record_unreadable(failure);
        }
        if let Completion::Cancelled { processed } =
            copier.copy_all(&collection.files, &layout, &mut reporter, progress)
        {
            warn!("Run cancelled after {} files", processed);
            reporter.mark_cancelled();
        }

        let structure = folder_structure(layout.root()).unwrap_or_else(|e| {
            warn!("Error reading final folder structure: {}", e);
            BTreeMap::new()
        });
        let summary = reporter.finish(structure);

        info!(
            "Sorting complete: {} copied, {} skipped, {} failed",
            summary.stats.copied_total(),
            summary.stats.skipped_identical,
            summary.stats.failed
        );
        progress.on_complete(&summary);
        Ok(summary)
    }
}

/// Run on a blocking worker task, streaming events to the caller.
///
/// The receiver yields [`RunEvent::Complete`] last when the run succeeds; a
/// pre-flight failure is returned through the join handle instead.
pub fn spawn_run(
    run: BackupRun,
) -> (
    JoinHandle<Result<RunSummary>>,
    mpsc::UnboundedReceiver<RunEvent>,
) {
    let (mut sink, receiver) = ChannelProgress::channel();
    let handle = tokio::task::spawn_blocking(move || run.execute(&mut sink));
    (handle, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copier::DuplicateCheck;
    use crate::events::NoProgress;
    use crate::Error;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    struct Scenario {
        _temp_dir: TempDir,
        source: PathBuf,
        destination: PathBuf,
    }

    impl Scenario {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let source = temp_dir.path().join("source");
            let destination = temp_dir.path().join("destination");
            fs::create_dir_all(&source).unwrap();
            fs::create_dir_all(&destination).unwrap();
            Self {
                _temp_dir: temp_dir,
                source,
                destination,
            }
        }

        fn write(&self, relative: &str, bytes: usize) {
            let path = self.source.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, vec![b'p'; bytes]).unwrap();
        }

        fn backup_root(&self) -> PathBuf {
            self.destination.join("Iphone_Photo_Backup")
        }

        fn run(&self) -> Result<RunSummary> {
            BackupRun::new(SorterConfig::default(), &self.source, &self.destination).execute(&mut NoProgress)
        }
    }

    #[test]
    fn test_fresh_backup() {
        let scenario = Scenario::new();
        scenario.write("2021/a.jpg", 10);
        scenario.write("2022/b.jpg", 20);

        let summary = scenario.run().unwrap();

        assert!(scenario.backup_root().join("2021").is_dir());
        assert!(scenario.backup_root().join("2022").is_dir());
        assert_eq!(fs::metadata(scenario.backup_root().join("2021/a.jpg")).unwrap().len(), 10);
        assert_eq!(fs::metadata(scenario.backup_root().join("2022/b.jpg")).unwrap().len(), 20);
        assert_eq!(summary.stats.copied, 2);
        assert_eq!(summary.stats.failed, 0);
        assert_eq!(summary.stats.skipped_identical, 0);
        assert_eq!(summary.years_processed(), vec!["2021", "2022"]);
        assert_eq!(summary.folder_structure.get("2021"), Some(&1));
    }

    #[test]
    fn test_unchanged_rerun_skips_everything() {
        let scenario = Scenario::new();
        scenario.write("2021/a.jpg", 10);
        scenario.write("2022/b.jpg", 20);
        scenario.run().unwrap();

        let summary = scenario.run().unwrap();

        assert_eq!(summary.stats.copied_total(), 0);
        assert_eq!(summary.stats.skipped_identical, 2);
        assert_eq!(summary.stats.total, 2);
    }

    #[test]
    fn test_changed_file_is_copied_under_new_name() {
        let scenario = Scenario::new();
        scenario.write("2021/a.jpg", 10);
        scenario.write("2022/b.jpg", 20);
        scenario.run().unwrap();

        scenario.write("2021/a.jpg", 15);
        let summary = scenario.run().unwrap();

        let bucket = scenario.backup_root().join("2021");
        assert_eq!(fs::metadata(bucket.join("a.jpg")).unwrap().len(), 10);
        assert_eq!(fs::metadata(bucket.join("a_1.jpg")).unwrap().len(), 15);
        assert_eq!(summary.stats.copied_total(), 1);
        assert_eq!(summary.stats.renamed, 1);
        assert_eq!(summary.stats.skipped_identical, 1);
    }

    #[test]
    fn test_no_subfolders_writes_nothing() {
        let scenario = Scenario::new();
        fs::write(scenario.source.join("loose.jpg"), b"x").unwrap();

        let err = scenario.run().unwrap_err();

        assert!(matches!(err, Error::NoSubfoldersFound { .. }));
        assert!(err.is_preflight());
        assert_eq!(fs::read_dir(&scenario.destination).unwrap().count(), 0);
    }

    #[test]
    fn test_no_valid_buckets_writes_nothing() {
        let scenario = Scenario::new();
        scenario.write("Camera Roll/a.jpg", 3);

        let err = scenario.run().unwrap_err();

        assert!(matches!(err, Error::NoValidBucketsFound { .. }));
        assert_eq!(fs::read_dir(&scenario.destination).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_year_folder_is_backed_up() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let scenario = Scenario::new();
        let odd = scenario.source.join(OsStr::from_bytes(b"2021 \xff trip"));
        fs::create_dir_all(&odd).unwrap();
        fs::write(odd.join("a.jpg"), b"abcd").unwrap();
        scenario.write("2022/b.jpg", 5);

        let summary = scenario.run().unwrap();

        assert_eq!(summary.planned, 2);
        assert_eq!(summary.stats.copied, 2);
        assert_eq!(summary.stats.failed, 0);
        assert!(scenario.backup_root().join("2021/a.jpg").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_tallied_as_failure() {
        use std::os::unix::fs::PermissionsExt;

        let scenario = Scenario::new();
        scenario.write("2021/a.jpg", 10);
        scenario.write("2021/locked/b.jpg", 10);
        let locked = scenario.source.join("2021/locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // privileged users ignore directory permissions
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let summary = scenario.run().unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(summary.planned, 2);
        assert_eq!(summary.stats.total, 2);
        assert_eq!(summary.stats.copied, 1);
        assert_eq!(summary.stats.failed, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].path, locked);
        assert!(summary.render_text().contains("Failed copies: 1"));
    }

    #[test]
    fn test_unknown_bucket_run() {
        let scenario = Scenario::new();
        scenario.write("2020/a.jpg", 3);
        scenario.write("Screenshots/b.png", 4);

        let config = SorterConfig {
            unknown_bucket_enabled: true,
            ..SorterConfig::default()
        };
        let summary = BackupRun::new(config, &scenario.source, &scenario.destination)
            .execute(&mut NoProgress)
            .unwrap();

        assert_eq!(summary.stats.copied, 2);
        assert!(scenario.backup_root().join("Unknown/b.png").exists());
        assert!(!summary.folder_structure.contains_key("Unknown"));
    }

    #[test]
    fn test_content_check_run() {
        let scenario = Scenario::new();
        scenario.write("2021/a.jpg", 10);
        let bucket = scenario.backup_root().join("2021");
        fs::create_dir_all(&bucket).unwrap();
        fs::write(bucket.join("a.jpg"), vec![b'q'; 10]).unwrap();

        let config = SorterConfig {
            duplicate_check: DuplicateCheck::Content,
            ..SorterConfig::default()
        };
        let summary = BackupRun::new(config, &scenario.source, &scenario.destination)
            .execute(&mut NoProgress)
            .unwrap();

        assert_eq!(summary.stats.renamed, 1);
        assert_eq!(fs::read(bucket.join("a.jpg")).unwrap(), vec![b'q'; 10]);
    }

    #[test]
    fn test_cancelled_before_start() {
        let scenario = Scenario::new();
        scenario.write("2021/a.jpg", 10);
        let run = BackupRun::new(SorterConfig::default(), &scenario.source, &scenario.destination);
        run.cancel_token().cancel();

        let summary = run.execute(&mut NoProgress).unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.stats.total, 0);
        assert_eq!(summary.planned, 1);
        assert!(!scenario.backup_root().join("2021/a.jpg").exists());
    }

    #[test]
    fn test_analysis_preview() {
        let scenario = Scenario::new();
        scenario.write("2021-01 Snow/a.jpg", 10);
        scenario.write("2021-07 Beach/b.jpg", 10);
        scenario.write("Misc/c.jpg", 10);
        fs::create_dir_all(scenario.backup_root().join("2019")).unwrap();

        let analysis = analyze(&SorterConfig::default(), &scenario.source, &scenario.destination).unwrap();

        assert_eq!(analysis.total_files(), 2);
        assert_eq!(analysis.inspection.existing_years, vec!["2019"]);
        let preview = analysis.render_preview();
        assert!(preview.contains("Found 3 subfolders"));
        assert!(preview.contains("Years identified: 2021"));
        assert!(preview.contains("Excluded subfolders: Misc"));
        assert!(preview.contains("  2021: 2 files"));
        assert!(preview.contains("Existing year folders: 2019"));
        assert!(!scenario.backup_root().join("2021").exists());
    }

    #[tokio::test]
    async fn test_spawned_run_streams_events() {
        let scenario = Scenario::new();
        scenario.write("2021/a.jpg", 10);
        scenario.write("2021/b.jpg", 11);

        let run = BackupRun::new(SorterConfig::default(), &scenario.source, &scenario.destination);
        let (handle, mut receiver) = spawn_run(run);

        let mut events = Vec::new();
        while let Some(event) = receiver.recv().await {
            events.push(event);
        }
        let summary = handle.await.unwrap().unwrap();

        assert!(matches!(events.first(), Some(RunEvent::Collected { total: 2 })));
        assert!(matches!(events.get(1), Some(RunEvent::LayoutReady { .. })));
        let progress = events
            .iter()
            .filter(|e| matches!(e, RunEvent::Progress { .. }))
            .count();
        assert_eq!(progress, 2);
        match events.last() {
            Some(RunEvent::Complete { summary: streamed }) => {
                assert_eq!(streamed.run_id, summary.run_id)
            }
            other => panic!("unexpected last event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spawned_run_reports_preflight_failure() {
        let scenario = Scenario::new();
        let run = BackupRun::new(SorterConfig::default(), &scenario.source.join("missing"), &scenario.destination);
        let (handle, mut receiver) = spawn_run(run);

        assert!(receiver.recv().await.is_none());
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::SourceNotFound { .. }));
    }
}
