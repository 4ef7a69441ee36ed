//! Delete-source command implementation.

use super::{confirm, confirm_typed};
use crate::cleanup::delete_source;
use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

/// Arguments for the delete-source command
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Original photo folder to delete
    #[arg(short, long)]
    pub source: PathBuf,

    /// Skip both confirmation prompts
    #[arg(long)]
    pub yes: bool,
}

/// Run the delete-source command
pub async fn run(args: DeleteArgs) -> Result<()> {
    if !args.yes && !confirm_deletion(&args.source)? {
        println!("Deletion cancelled.");
        return Ok(());
    }

    delete_source(&args.source)
        .with_context(|| format!("Error deleting {}", args.source.display()))?;
    println!("Original folder deleted: {}", args.source.display());
    Ok(())
}

/// Two-step confirmation before removing the source tree
pub(crate) fn confirm_deletion(source: &Path) -> Result<bool> {
    println!("WARNING: This will permanently delete the original folder:");
    println!("  {}", source.display());
    println!("This action cannot be undone!");

    if !confirm("Are you absolutely sure you want to continue?")? {
        return Ok(false);
    }
    Ok(confirm_typed("Type 'YES' to confirm deletion:", "YES")?)
}
