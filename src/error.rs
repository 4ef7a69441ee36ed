//! Error types for the photo backup engine

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for backup operations.
///
/// Only pre-flight conditions and configuration problems surface here. Per-file
/// copy failures are recorded as [`crate::copier::CopyOutcome::Failed`] and never
/// abort a run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Source folder does not exist: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("No subfolders found in source directory: {path}")]
    NoSubfoldersFound { path: PathBuf },

    #[error("No valid year-based folders found in: {path}")]
    NoValidBucketsFound { path: PathBuf },

    #[error("Destination is not writable: {path}: {source}")]
    DestinationNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },
}

impl Error {
    /// Whether the error was raised before any file was written.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Error::SourceNotFound { .. }
                | Error::NoSubfoldersFound { .. }
                | Error::NoValidBucketsFound { .. }
                | Error::DestinationNotWritable { .. }
        )
    }
}

/// Result type alias for backup operations
pub type Result<T> = std::result::Result<T, Error>;
