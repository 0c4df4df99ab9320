//! Publish command implementation
//!
//! Implements `monorail publish`: consume pending change files, bump
//! package versions (propagating through the dependency graph), rewrite
//! dependent ranges, and emit changelogs. Without `--apply` the command
//! reports what would happen and leaves disk untouched.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::output;
use crate::config::defaults::CHANGES_FOLDER;
use crate::core::changes::{self, PipelineOptions};
use crate::core::workspace::Workspace;
use crate::error::MonorailError;

/// Publish options
pub struct PublishOptions {
    /// Apply changes to disk (default is a dry run)
    pub apply: bool,
    /// Suffix released versions with a prerelease token
    pub prerelease: Option<String>,
    /// Packages excluded from version bumps
    pub exclude: Vec<String>,
}

/// Execute the publish command
pub async fn execute(repo_root: &Path, options: PublishOptions) -> Result<()> {
    let mut workspace = Workspace::load(repo_root).map_err(MonorailError::from)?;
    let folder = repo_root.join(CHANGES_FOLDER);

    let pipeline_options = PipelineOptions {
        prerelease_token: options.prerelease,
        exclude: options.exclude.into_iter().collect(),
        dry_run: !options.apply,
    };

    let result = changes::execute(&mut workspace, &folder, &pipeline_options)
        .context("Change pipeline failed")?;

    if result.applied.is_empty() {
        println!("{} No changes to publish", output::status::INFO);
        return Ok(());
    }

    let verb = if pipeline_options.dry_run {
        "Would apply"
    } else {
        "Applied"
    };
    println!("{verb} {} change(s):", result.applied.len());
    for change in &result.applied {
        if change.version_changed() {
            println!(
                "  {} {} -> {} ({:?})",
                change.package_name, change.current_version, change.new_version, change.kind
            );
        } else {
            println!("  {} ({:?})", change.package_name, change.kind);
        }
    }

    if pipeline_options.dry_run {
        println!(
            "{} Dry run; {} change file(s) left in place. Re-run with --apply.",
            output::status::INFO,
            result.consumed_files.len()
        );
    } else {
        println!(
            "{} {} change file(s) consumed",
            output::status::SUCCESS,
            result.consumed_files.len()
        );
    }
    Ok(())
}
