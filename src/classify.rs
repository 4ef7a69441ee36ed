//! Year classification of source subfolder names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Directory name used for the fallback bucket.
pub const UNKNOWN_BUCKET_NAME: &str = "Unknown";

/// Destination bucket a source file is sorted into
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "year")]
pub enum BucketKey {
    /// Four ascii digits taken from the subfolder name
    Year(String),
    /// Subfolder name did not start with a year
    Unknown,
}

impl BucketKey {
    /// Name of the bucket directory under the backup root
    pub fn dir_name(&self) -> &str {
        match self {
            BucketKey::Year(year) => year,
            BucketKey::Unknown => UNKNOWN_BUCKET_NAME,
        }
    }

    pub fn is_year(&self) -> bool {
        matches!(self, BucketKey::Year(_))
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Maps folder names to bucket keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct YearClassifier {
    unknown_bucket_enabled: bool,
}

impl YearClassifier {
    pub fn new(unknown_bucket_enabled: bool) -> Self {
        Self {
            unknown_bucket_enabled,
        }
    }

    /// Classify a folder name.
    ///
    /// Returns `None` when the name has no year prefix and the unknown bucket
    /// is disabled; such folders are excluded from the run.
    pub fn classify(&self, folder_name: &str) -> Option<BucketKey> {
        match year_prefix(folder_name) {
            Some(year) => Some(BucketKey::Year(year.to_string())),
            None if self.unknown_bucket_enabled => Some(BucketKey::Unknown),
            None => None,
        }
    }
}

/// First four characters of `name` when all of them are ascii digits.
pub fn year_prefix(name: &str) -> Option<&str> {
    let mut chars = name.char_indices();
    for _ in 0..4 {
        match chars.next() {
            Some((_, c)) if c.is_ascii_digit() => {}
            _ => return None,
        }
    }
    // four ascii digits occupy exactly four bytes
    Some(&name[..4])
}

/// True for names that are exactly a four digit year, as used for bucket
/// directories inside the backup root.
pub fn is_year_dir_name(name: &str) -> bool {
    name.len() == 4 && name.bytes().all(|b| b.is_ascii_digit())
}
