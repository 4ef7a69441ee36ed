//! # photo_year_backup
//!
//! Copies a photo library whose top-level folders are named after events
//! (`2021-07 Beach Trip`, `2022 Christmas`, ...) into a backup tree organized
//! by year.
//!
//! ## Features
//!
//! - **Classification**: a folder's year is its 4-digit name prefix, with an
//!   optional `Unknown` bucket for everything else
//! - **Reconciling copy**: re-runs skip files already backed up and keep
//!   changed files side by side under `name_N.ext`
//! - **Reporting**: run statistics, a timestamped run log and a JSON report in
//!   the backup root
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use photo_year_backup::config::SorterConfig;
//! use photo_year_backup::events::NoProgress;
//! use photo_year_backup::pipeline::BackupRun;
//! use std::path::Path;
//!
//! # fn main() -> photo_year_backup::Result<()> {
//! let run = BackupRun::new(SorterConfig::default(), Path::new("./Photos"), Path::new("/mnt/backup"));
//! let summary = run.execute(&mut NoProgress)?;
//! println!("{} files copied", summary.stats.copied_total());
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod cleanup;
pub mod cli;
pub mod collect;
pub mod config;
pub mod copier;
pub mod error;
pub mod events;
pub mod layout;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod runlog;

pub use error::{Error, Result};

/// Version of the photo backup engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
