//! Backup destination layout.
//!
//! The backup root lives under a destination base directory and holds one
//! subdirectory per bucket. Preparing the layout is idempotent so a new source
//! run can be added to an existing backup.

use crate::classify::{is_year_dir_name, BucketKey};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Default name of the backup root created under the destination base
pub const DEFAULT_BACKUP_DIR_NAME: &str = "Iphone_Photo_Backup";

/// State of the destination before a run, for the operator preview
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutInspection {
    pub backup_root: PathBuf,
    pub root_exists: bool,
    /// Children of the backup root that are already valid year buckets
    pub existing_years: Vec<String>,
}

impl LayoutInspection {
    /// Look at `<destination_base>/<backup_dir_name>` without writing anything
    pub fn inspect(destination_base: &Path, backup_dir_name: &str) -> Result<Self> {
        let backup_root = destination_base.join(backup_dir_name);
        let root_exists = backup_root.is_dir();
        let mut existing_years = Vec::new();

        if root_exists {
            for entry in fs::read_dir(&backup_root)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if entry.path().is_dir() && is_year_dir_name(&name) {
                    existing_years.push(name);
                }
            }
            existing_years.sort();
        }

        Ok(Self {
            backup_root,
            root_exists,
            existing_years,
        })
    }
}

/// Bucket to destination directory mapping for one run
#[derive(Debug, Clone)]
pub struct BackupLayout {
    root: PathBuf,
    buckets: BTreeMap<BucketKey, PathBuf>,
}

impl BackupLayout {
    /// Create the backup root and one directory per bucket.
    ///
    /// Directories that already exist are reused untouched.
    pub fn prepare<'a, I>(destination_base: &Path, backup_dir_name: &str, buckets: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a BucketKey>,
    {
        let root = destination_base.join(backup_dir_name);
        create_dir(&root)?;

        let mut layout = Self {
            root,
            buckets: BTreeMap::new(),
        };
        for bucket in buckets {
            layout.ensure_bucket(bucket)?;
        }

        info!(
            "Prepared backup layout at {} ({} buckets)",
            layout.root.display(),
            layout.buckets.len()
        );
        Ok(layout)
    }

    /// Register a bucket, creating its directory if needed
    pub fn ensure_bucket(&mut self, bucket: &BucketKey) -> Result<&Path> {
        if !self.buckets.contains_key(bucket) {
            let dir = self.root.join(bucket.dir_name());
            create_dir(&dir)?;
            self.buckets.insert(bucket.clone(), dir);
        }
        Ok(self.buckets[bucket].as_path())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bucket_dir(&self, bucket: &BucketKey) -> Option<&Path> {
        self.buckets.get(bucket).map(PathBuf::as_path)
    }

    pub fn buckets(&self) -> impl Iterator<Item = &BucketKey> {
        self.buckets.keys()
    }
}

fn create_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        debug!("Reusing existing directory {}", path.display());
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|source| Error::DestinationNotWritable {
        path: path.to_path_buf(),
        source,
    })
}

/// File count per year directory in a backup root, sorted by year
pub fn folder_structure(backup_root: &Path) -> Result<BTreeMap<String, usize>> {
    let mut structure = BTreeMap::new();
    let year_dirs: BTreeSet<String> = fs::read_dir(backup_root)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| is_year_dir_name(name))
        .collect();

    for year in year_dirs {
        let count = WalkDir::new(backup_root.join(&year))
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping entry while counting {}: {}", year, e);
                    None
                }
            })
            .filter(|entry| !entry.file_type().is_dir())
            .count();
        structure.insert(year, count);
    }

    Ok(structure)
}
