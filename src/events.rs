//! Run events and progress callbacks.
//!
//! The copy engine reports through [`CopyProgress`]. A presentation layer that
//! runs the engine on a background task receives the same notifications as
//! [`RunEvent`] messages over a channel.

use crate::classify::BucketKey;
use crate::collect::SourceFile;
use crate::copier::CopyOutcome;
use crate::report::RunSummary;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::debug;

/// Progress callbacks for a backup run.
///
/// Indices are 1-based: `index` is the number of files processed so far.
pub trait CopyProgress {
    /// Called once the source tree has been collected
    fn on_collected(&mut self, _total: usize) {}

    /// Called once bucket directories exist under the backup root
    fn on_layout_ready(&mut self, _backup_root: &Path, _buckets: &[BucketKey]) {}

    /// Called after every file
    fn on_progress(&mut self, index: usize, total: usize);

    /// Called at a lower frequency, suitable for durable logs
    fn on_checkpoint(&mut self, index: usize, total: usize);

    /// Called with the outcome of every file
    fn on_file_outcome(&mut self, file: &SourceFile, outcome: &CopyOutcome);

    /// Called once the run summary is final
    fn on_complete(&mut self, _summary: &RunSummary) {}
}

/// Discards all notifications
#[derive(Debug, Default)]
pub struct NoProgress;

impl CopyProgress for NoProgress {
    fn on_progress(&mut self, _index: usize, _total: usize) {}
    fn on_checkpoint(&mut self, _index: usize, _total: usize) {}
    fn on_file_outcome(&mut self, _file: &SourceFile, _outcome: &CopyOutcome) {}
}

/// Message form of the [`CopyProgress`] callbacks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Collected {
        total: usize,
    },
    LayoutReady {
        backup_root: PathBuf,
        buckets: Vec<BucketKey>,
    },
    Progress {
        index: usize,
        total: usize,
    },
    Checkpoint {
        index: usize,
        total: usize,
    },
    FileOutcome {
        file: SourceFile,
        outcome: CopyOutcome,
    },
    Complete {
        summary: Box<RunSummary>,
    },
}

/// Forwards callbacks from the worker into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    sender: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelProgress {
    pub fn new(sender: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self { sender }
    }

    /// Create a sink together with the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    fn send(&self, event: RunEvent) {
        if self.sender.send(event).is_err() {
            debug!("Run event dropped, receiver closed");
        }
    }
}

impl CopyProgress for ChannelProgress {
    fn on_collected(&mut self, total: usize) {
        self.send(RunEvent::Collected { total });
    }

    fn on_layout_ready(&mut self, backup_root: &Path, buckets: &[BucketKey]) {
        self.send(RunEvent::LayoutReady {
            backup_root: backup_root.to_path_buf(),
            buckets: buckets.to_vec(),
        });
    }

    fn on_progress(&mut self, index: usize, total: usize) {
        self.send(RunEvent::Progress { index, total });
    }

    fn on_checkpoint(&mut self, index: usize, total: usize) {
        self.send(RunEvent::Checkpoint { index, total });
    }

    fn on_file_outcome(&mut self, file: &SourceFile, outcome: &CopyOutcome) {
        self.send(RunEvent::FileOutcome {
            file: file.clone(),
            outcome: outcome.clone(),
        });
    }

    fn on_complete(&mut self, summary: &RunSummary) {
        self.send(RunEvent::Complete {
            summary: Box::new(summary.clone()),
        });
    }
}
