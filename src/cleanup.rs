//! Removal of the original source folder after a verified backup.
//!
//! Nothing in the copy path calls this. The caller confirms with the operator
//! first.

use crate::{Error, Result};
use std::fs;
use std::path::Path;
use tracing::info;

/// Recursively delete `source_root`
pub fn delete_source(source_root: &Path) -> Result<()> {
    if !source_root.is_dir() {
        return Err(Error::SourceNotFound {
            path: source_root.to_path_buf(),
        });
    }

    info!("Deleting original folder: {}", source_root.display());
    fs::remove_dir_all(source_root)?;
    info!("Original folder deleted successfully");
    Ok(())
}
