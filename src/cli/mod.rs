//! Command-line interface for photo-year-backup.
//!
//! Each subcommand lives in its own module with an `Args` struct and an async
//! `run` entry point.

use crate::config::SorterConfig;
use crate::logging::LogFormat;
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

pub mod analyze;
pub mod delete;
pub mod sort;

/// Back up year-named photo folders into a year-organized tree
#[derive(Parser)]
#[command(name = "photo-year-backup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable quiet mode (reduce output)
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Log format: text or json
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, env = "PHOTO_YEAR_BACKUP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Preview what a sort would do without writing anything
    Analyze(analyze::AnalyzeArgs),
    /// Copy the source library into the year-organized backup
    Sort(sort::SortArgs),
    /// Delete the original source folder
    DeleteSource(delete::DeleteArgs),
}

/// Source and destination shared by `analyze` and `sort`
#[derive(Args, Debug, Clone)]
pub struct RunPaths {
    /// Folder containing the year-named subfolders
    #[arg(short, long)]
    pub source: PathBuf,

    /// Folder in which the backup root is created
    #[arg(short, long)]
    pub destination: PathBuf,

    /// Back up subfolders without a year prefix into an Unknown folder
    #[arg(long)]
    pub unknown_bucket: bool,
}

impl RunPaths {
    pub fn apply(&self, config: &mut SorterConfig) {
        if self.unknown_bucket {
            config.unknown_bucket_enabled = true;
        }
    }
}

/// Attach operator-facing context to an error raised while preparing a run
pub fn describe_failure(err: crate::Error, source: &Path) -> anyhow::Error {
    let context = if err.is_preflight() {
        format!("Nothing was copied: pre-flight check failed for {}", source.display())
    } else {
        format!("Error analyzing {}", source.display())
    };
    anyhow::Error::new(err).context(context)
}

/// Ask a y/N question on stdin. Anything but an answer starting with `y` is a no.
pub fn confirm(question: &str) -> io::Result<bool> {
    let answer = prompt(&format!("{} (y/N)", question))?;
    Ok(answer.trim().to_lowercase().starts_with('y'))
}

/// Ask for an exact word to be typed back
pub fn confirm_typed(question: &str, expected: &str) -> io::Result<bool> {
    let answer = prompt(question)?;
    Ok(answer.trim() == expected)
}

fn prompt(question: &str) -> io::Result<String> {
    print!("{} ", question);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input)
}
