//! Link and unlink command implementations
//!
//! `monorail link` materializes local project symlinks from a freshly
//! computed install plan; `monorail unlink` removes them.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::output;
use crate::core::install_plan::InstallPlan;
use crate::core::linker::Linker;
use crate::core::workspace::Workspace;
use crate::error::MonorailError;

/// Execute the link command
pub async fn execute_link(repo_root: &Path) -> Result<()> {
    let workspace = Workspace::load(repo_root).map_err(MonorailError::from)?;
    let plan = InstallPlan::compute(&workspace).context("Failed to compute the install plan")?;

    let linker = Linker::new(&workspace);
    let created = linker
        .link_all(&plan.local_links)
        .context("Failed to link local projects")?;
    println!("{} {created} local link(s) created", output::status::SUCCESS);
    Ok(())
}

/// Execute the unlink command
pub async fn execute_unlink(repo_root: &Path) -> Result<()> {
    let workspace = Workspace::load(repo_root).map_err(MonorailError::from)?;
    let linker = Linker::new(&workspace);
    linker.unlink_all().context("Failed to unlink local projects")?;
    println!("{} Local links removed", output::status::SUCCESS);
    Ok(())
}
