//! Source tree collection.
//!
//! Walks every immediate subfolder of a source root and tags each file found
//! with the bucket derived from that subfolder's name.

use crate::classify::{BucketKey, YearClassifier};
use crate::report::FileFailure;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, span, warn, Level};
use walkdir::WalkDir;

/// A file discovered under the source root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub size: u64,
    pub bucket: BucketKey,
}

/// One immediate subfolder of the source root and how it was classified
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subfolder {
    /// Display name, used for classification
    pub name: String,
    /// Path as listed on disk, walked as-is
    pub path: PathBuf,
    /// `None` when the folder was excluded from the run
    pub bucket: Option<BucketKey>,
}

/// Everything the collector found under a source root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub source_root: PathBuf,
    pub subfolders: Vec<Subfolder>,
    pub files: Vec<SourceFile>,
    /// Entries inside a bucket subfolder that the walk could not read
    pub unreadable: Vec<FileFailure>,
}

impl Collection {
    /// Buckets that need a destination directory
    pub fn buckets(&self) -> BTreeSet<BucketKey> {
        self.subfolders
            .iter()
            .filter_map(|s| s.bucket.clone())
            .collect()
    }

    /// Sorted, de-duplicated years identified from subfolder names
    pub fn years(&self) -> Vec<String> {
        self.buckets()
            .into_iter()
            .filter_map(|key| match key {
                BucketKey::Year(year) => Some(year),
                BucketKey::Unknown => None,
            })
            .collect()
    }

    pub fn files_per_bucket(&self) -> BTreeMap<BucketKey, usize> {
        let mut counts = BTreeMap::new();
        for file in &self.files {
            *counts.entry(file.bucket.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    pub fn excluded_subfolders(&self) -> impl Iterator<Item = &Subfolder> {
        self.subfolders.iter().filter(|s| s.bucket.is_none())
    }
}

/// Collects source files grouped by year bucket
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeCollector {
    classifier: YearClassifier,
}

impl TreeCollector {
    pub fn new(classifier: YearClassifier) -> Self {
        Self { classifier }
    }

    /// Enumerate and classify the immediate subfolders of `source_root`.
    ///
    /// Fails before touching any file when the root is missing, has no
    /// subfolders, or has no subfolder carrying a year.
    pub fn classify_subfolders(&self, source_root: &Path) -> Result<Vec<Subfolder>> {
        if !source_root.is_dir() {
            return Err(Error::SourceNotFound {
                path: source_root.to_path_buf(),
            });
        }

        let mut dirs = Vec::new();
        for entry in fs::read_dir(source_root)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();

        if dirs.is_empty() {
            return Err(Error::NoSubfoldersFound {
                path: source_root.to_path_buf(),
            });
        }

        let subfolders: Vec<Subfolder> = dirs
            .into_iter()
            .map(|path| {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let bucket = self.classifier.classify(&name);
                if bucket.is_none() {
                    debug!("Excluding subfolder without year prefix: {}", name);
                }
                Subfolder { name, path, bucket }
            })
            .collect();

        if !subfolders
            .iter()
            .any(|s| s.bucket.as_ref().is_some_and(BucketKey::is_year))
        {
            return Err(Error::NoValidBucketsFound {
                path: source_root.to_path_buf(),
            });
        }

        Ok(subfolders)
    }

    /// Walk the source root and return every file with its bucket.
    ///
    /// Calling this again re-enumerates the tree from scratch; nothing on disk
    /// is modified.
    pub fn collect(&self, source_root: &Path) -> Result<Collection> {
        let span = span!(Level::INFO, "collect", root = %source_root.display());
        let _enter = span.enter();

        let subfolders = self.classify_subfolders(source_root)?;
        let mut files = Vec::new();
        let mut unreadable = Vec::new();

        for subfolder in &subfolders {
            let Some(bucket) = &subfolder.bucket else {
                continue;
            };

            for entry in WalkDir::new(&subfolder.path)
                .follow_links(false)
                .sort_by_file_name()
            {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Skipping unreadable entry: {}", e);
                        unreadable.push(FileFailure {
                            path: e.path().unwrap_or(subfolder.path.as_path()).to_path_buf(),
                            bucket: bucket.clone(),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };

                if entry.file_type().is_dir() {
                    continue;
                }

                let size = match entry.metadata() {
                    Ok(metadata) => metadata.len(),
                    Err(e) => {
                        warn!("Could not read size of {}: {}", entry.path().display(), e);
                        0
                    }
                };

                files.push(SourceFile {
                    path: entry.into_path(),
                    size,
                    bucket: bucket.clone(),
                });
            }
        }

        info!(
            "Collected {} files from {} subfolders",
            files.len(),
            subfolders.len()
        );

        Ok(Collection {
            source_root: source_root.to_path_buf(),
            subfolders,
            files,
            unreadable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(path: &Path, bytes: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![b'x'; bytes]).unwrap();
    }

    #[test]
    fn test_missing_source_root() {
        let temp_dir = TempDir::new().unwrap();
        let collector = TreeCollector::default();

        let err = collector.collect(&temp_dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::SourceNotFound { .. }));
    }

    #[test]
    fn test_root_without_subfolders() {
        let temp_dir = TempDir::new().unwrap();
        write(&temp_dir.path().join("loose.jpg"), 3);

        let err = TreeCollector::default().collect(temp_dir.path()).unwrap_err();
        assert!(matches!(err, Error::NoSubfoldersFound { .. }));
    }

    #[test]
    fn test_no_year_subfolders() {
        let temp_dir = TempDir::new().unwrap();
        write(&temp_dir.path().join("DCIM/a.jpg"), 3);
        write(&temp_dir.path().join("misc/b.jpg"), 3);

        for unknown in [false, true] {
            let collector = TreeCollector::new(YearClassifier::new(unknown));
            let err = collector.collect(temp_dir.path()).unwrap_err();
            assert!(matches!(err, Error::NoValidBucketsFound { .. }));
        }
    }

    #[test]
    fn test_collects_nested_files_with_bucket() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("2021-05 Holiday/a.jpg"), 10);
        write(&root.join("2021-05 Holiday/deep/er/b.heic"), 20);
        write(&root.join("2022/c.jpg"), 30);
        write(&root.join("Screenshots/d.png"), 40);
        write(&root.join("top-level.jpg"), 50);

        let collection = TreeCollector::new(YearClassifier::new(false))
            .collect(root)
            .unwrap();

        let names: Vec<(String, String)> = collection
            .files
            .iter()
            .map(|f| {
                (
                    f.path.file_name().unwrap().to_string_lossy().into_owned(),
                    f.bucket.to_string(),
                )
            })
            .collect();
        assert_eq!(
            names,
            vec![
                ("a.jpg".to_string(), "2021".to_string()),
                ("b.heic".to_string(), "2021".to_string()),
                ("c.jpg".to_string(), "2022".to_string()),
            ]
        );
        assert_eq!(collection.total_bytes(), 60);
        assert_eq!(collection.years(), vec!["2021", "2022"]);
        assert_eq!(collection.excluded_subfolders().count(), 1);
    }

    #[test]
    fn test_unknown_bucket_collects_everything() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("2020/a.jpg"), 1);
        write(&root.join("Screenshots/b.png"), 1);

        let collection = TreeCollector::new(YearClassifier::new(true))
            .collect(root)
            .unwrap();

        let per_bucket = collection.files_per_bucket();
        assert_eq!(per_bucket.get(&BucketKey::Year("2020".into())), Some(&1));
        assert_eq!(per_bucket.get(&BucketKey::Unknown), Some(&1));
        assert!(collection.buckets().contains(&BucketKey::Unknown));
        assert_eq!(collection.years(), vec!["2020"]);
    }

    #[test]
    fn test_empty_year_folder_still_yields_bucket() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("2019")).unwrap();
        write(&temp_dir.path().join("2020/a.jpg"), 1);

        let collection = TreeCollector::default().collect(temp_dir.path()).unwrap();
        assert_eq!(collection.files.len(), 1);
        assert_eq!(collection.years(), vec!["2019", "2020"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_subfolder_is_walked() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let odd = root.join(OsStr::from_bytes(b"2021 \xff trip"));
        write(&odd.join("a.jpg"), 4);
        write(&root.join("2022/b.jpg"), 5);

        let collection = TreeCollector::default().collect(root).unwrap();

        assert_eq!(collection.files.len(), 2);
        assert!(collection.unreadable.is_empty());
        assert_eq!(collection.files[0].path, odd.join("a.jpg"));
        assert_eq!(collection.files[0].bucket, BucketKey::Year("2021".into()));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("2021/a.jpg"), 1);
        let locked = root.join("2021/locked");
        write(&locked.join("hidden.jpg"), 1);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // privileged users ignore directory permissions
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let collection = TreeCollector::default().collect(root).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(collection.files.len(), 1);
        assert_eq!(collection.unreadable.len(), 1);
        assert_eq!(collection.unreadable[0].path, locked);
        assert_eq!(collection.unreadable[0].bucket, BucketKey::Year("2021".into()));
    }

    #[test]
    fn test_collection_is_repeatable() {
        let temp_dir = TempDir::new().unwrap();
        write(&temp_dir.path().join("2020/a.jpg"), 1);
        write(&temp_dir.path().join("2020/b.jpg"), 2);

        let collector = TreeCollector::default();
        let first = collector.collect(temp_dir.path()).unwrap();
        let second = collector.collect(temp_dir.path()).unwrap();
        assert_eq!(first.files, second.files);
    }
}
