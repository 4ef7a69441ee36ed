//! Reconciling copy of collected files into the backup layout.
//!
//! Each file is checked against whatever already sits at its destination
//! before anything is written:
//!
//! - nothing there: copy it
//! - a file of the same size: treat it as already backed up and skip it
//! - a file of a different size: copy under `name_1.ext`, `name_2.ext`, ...
//!
//! Size equality is the whole duplicate test unless [`DuplicateCheck::Content`]
//! is selected. A destination file is never overwritten, and a failure on one
//! file is recorded and the run moves on.
//!
//! Known limitation: a file that was once copied under a new name is compared
//! only against the plain name on later runs, so each re-run with the same
//! changed file adds another `name_N.ext`.

use crate::collect::SourceFile;
use crate::events::CopyProgress;
use crate::layout::BackupLayout;
use crate::report::RunReporter;
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, span, warn, Level};

/// Failure reason recorded when a file's bucket has no directory
pub const NO_DESTINATION_BUCKET: &str = "no destination bucket";

/// Default number of files between checkpoint notifications
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 100;

/// Result of reconciling one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CopyOutcome {
    /// Copied to a previously unused destination path
    Copied { destination: PathBuf },
    /// A file of the same size already exists at the destination
    SkippedIdentical { destination: PathBuf },
    /// Copied under a new name next to a different file of the same name
    CopiedRenamed { destination: PathBuf },
    /// Nothing written
    Failed { reason: String },
}

impl CopyOutcome {
    pub fn destination(&self) -> Option<&Path> {
        match self {
            CopyOutcome::Copied { destination }
            | CopyOutcome::SkippedIdentical { destination }
            | CopyOutcome::CopiedRenamed { destination } => Some(destination),
            CopyOutcome::Failed { .. } => None,
        }
    }

    pub fn is_copy(&self) -> bool {
        matches!(self, CopyOutcome::Copied { .. } | CopyOutcome::CopiedRenamed { .. })
    }
}

/// How an existing destination file is judged to be the same file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateCheck {
    /// Equal size means duplicate
    #[default]
    Size,
    /// Equal size and equal BLAKE3 digest
    Content,
}

/// Cooperative cancellation flag, checked between files
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a copy pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Finished,
    Cancelled { processed: usize },
}

/// Copies files one at a time into their bucket directories
#[derive(Debug, Clone)]
pub struct ReconcilingCopier {
    duplicate_check: DuplicateCheck,
    checkpoint_interval: usize,
    cancel: CancelToken,
}

impl Default for ReconcilingCopier {
    fn default() -> Self {
        Self {
            duplicate_check: DuplicateCheck::Size,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            cancel: CancelToken::new(),
        }
    }
}

impl ReconcilingCopier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duplicate_check(mut self, duplicate_check: DuplicateCheck) -> Self {
        self.duplicate_check = duplicate_check;
        self
    }

    /// Emit a checkpoint every `interval` files. Zero is treated as one.
    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval.max(1);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process `files` in order, feeding every outcome to `reporter` and
    /// `progress`.
    pub fn copy_all<P>(
        &self,
        files: &[SourceFile],
        layout: &BackupLayout,
        reporter: &mut RunReporter,
        progress: &mut P,
    ) -> Completion
    where
        P: CopyProgress + ?Sized,
    {
        let span = span!(Level::INFO, "copy_all", files = files.len());
        let _enter = span.enter();

        let total = files.len();
        info!("Starting file copy process for {} files", total);

        for (position, file) in files.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Copy cancelled after {} of {} files", position, total);
                return Completion::Cancelled {
                    processed: position,
                };
            }

            let outcome = self.copy_file(file, layout);
            reporter.record(file, &outcome);
            progress.on_file_outcome(file, &outcome);

            let index = position + 1;
            progress.on_progress(index, total);
            if index % self.checkpoint_interval == 0 || index == total {
                progress.on_checkpoint(index, total);
            }
        }

        Completion::Finished
    }

    /// Reconcile and copy a single file
    pub fn copy_file(&self, file: &SourceFile, layout: &BackupLayout) -> CopyOutcome {
        let Some(dir) = layout.bucket_dir(&file.bucket) else {
            warn!(
                "No destination folder for bucket {}, skipping {}",
                file.bucket,
                file.path.display()
            );
            return CopyOutcome::Failed {
                reason: NO_DESTINATION_BUCKET.to_string(),
            };
        };

        let Some(file_name) = file.path.file_name() else {
            return CopyOutcome::Failed {
                reason: format!("{} has no file name", file.path.display()),
            };
        };

        let candidate = dir.join(file_name);
        match self.reconcile(&file.path, &candidate) {
            Ok(outcome) => {
                debug!("{} -> {:?}", file.path.display(), outcome);
                outcome
            }
            Err(e) => {
                warn!("Error copying {}: {}", file.path.display(), e);
                CopyOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn reconcile(&self, source: &Path, candidate: &Path) -> io::Result<CopyOutcome> {
        let source_size = fs::metadata(source)?.len();

        // follows links; a dangling link still occupies the name
        let existing = match fs::metadata(candidate) {
            Ok(metadata) => Some(metadata),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        let Some(existing) = existing else {
            if occupied(candidate)? {
                let destination = copy_renamed(source, candidate)?;
                return Ok(CopyOutcome::CopiedRenamed { destination });
            }
            copy_new(source, candidate)?;
            return Ok(CopyOutcome::Copied {
                destination: candidate.to_path_buf(),
            });
        };

        if existing.is_file() && existing.len() == source_size && self.same_content(source, candidate)? {
            return Ok(CopyOutcome::SkippedIdentical {
                destination: candidate.to_path_buf(),
            });
        }

        let destination = copy_renamed(source, candidate)?;
        Ok(CopyOutcome::CopiedRenamed { destination })
    }

    fn same_content(&self, source: &Path, existing: &Path) -> io::Result<bool> {
        match self.duplicate_check {
            DuplicateCheck::Size => Ok(true),
            DuplicateCheck::Content => Ok(hash_file(source)? == hash_file(existing)?),
        }
    }
}

/// `dir/stem_N.ext` for a candidate `dir/stem.ext`
pub fn numbered_path(candidate: &Path, counter: u64) -> PathBuf {
    let mut name: OsString = candidate.file_stem().unwrap_or_default().to_os_string();
    name.push(format!("_{}", counter));
    if let Some(extension) = candidate.extension() {
        name.push(".");
        name.push(extension);
    }
    candidate.with_file_name(name)
}

fn copy_renamed(source: &Path, candidate: &Path) -> io::Result<PathBuf> {
    let mut counter = 1;
    loop {
        let target = numbered_path(candidate, counter);
        if !occupied(&target)? {
            match copy_new(source, &target) {
                Ok(()) => return Ok(target),
                // taken between the check and the create
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }
        }
        counter += 1;
    }
}

fn occupied(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Copy contents into a path that must not exist yet, then carry over
/// timestamps and permissions. A partially written target is removed.
fn copy_new(source: &Path, target: &Path) -> io::Result<()> {
    let metadata = fs::metadata(source)?;
    let mut reader = File::open(source)?;
    let mut writer = OpenOptions::new().write(true).create_new(true).open(target)?;

    let written = io::copy(&mut reader, &mut writer).and_then(|_| writer.sync_all());
    drop(writer);
    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(target) {
            warn!("Could not remove partial copy {}: {}", target.display(), cleanup);
        }
        return Err(e);
    }

    filetime::set_file_times(
        target,
        FileTime::from_last_access_time(&metadata),
        FileTime::from_last_modification_time(&metadata),
    )?;
    fs::set_permissions(target, metadata.permissions())?;
    Ok(())
}

fn hash_file(path: &Path) -> io::Result<blake3::Hash> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize())
}
