//! Generate command implementation
//!
//! Implements `monorail generate`: rebuild the install plan and the
//! lockfile from scratch, even when the committed lockfile still looks
//! valid. The working lockfile is removed so the installer re-resolves,
//! and the result is copied back over the committed file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::cli::output;
use crate::config::defaults::WORKING_LOCKFILE_PATH;
use crate::core::install_plan::InstallPlan;
use crate::core::installer::{InstallDriver, InstallMode};
use crate::core::linker::Linker;
use crate::core::workspace::Workspace;
use crate::error::MonorailError;
use crate::infra::filesystem;

/// Execute the generate command
pub async fn execute(repo_root: &Path) -> Result<()> {
    let workspace = Workspace::load(repo_root).map_err(MonorailError::from)?;
    workspace
        .validate_local_dependencies()
        .map_err(MonorailError::from)?;

    let plan = InstallPlan::compute(&workspace).context("Failed to compute the install plan")?;
    plan.write(repo_root).context("Failed to write the install plan")?;

    // Drop the working lockfile so the installer resolves from scratch
    let working = repo_root.join(WORKING_LOCKFILE_PATH);
    filesystem::remove_file(&working).context("Failed to remove the working lockfile")?;

    let stub_paths: Vec<PathBuf> = plan
        .stubs
        .iter()
        .map(|stub| plan.stub_archive_path(repo_root, stub))
        .collect();

    let spinner = output::create_spinner("Regenerating the dependency tree...");
    let driver = InstallDriver::new(
        repo_root,
        &workspace.config.installer_tool_name,
        &workspace.config.installer_tool_version,
        InstallMode::ForceClean,
    );
    let outcome = driver.run(&stub_paths);
    spinner.finish_and_clear();
    outcome.context("Install failed")?;

    // The installer leaves the fresh resolution in the working location
    let committed = repo_root.join(&workspace.config.lockfile_path);
    if working.exists() {
        filesystem::copy_file(&working, &committed)
            .context("Failed to update the committed lockfile")?;
        println!(
            "{} Lockfile regenerated at '{}'",
            output::status::SUCCESS,
            committed.display()
        );
    } else {
        tracing::warn!("The installer produced no lockfile; nothing to commit");
    }

    let linker = Linker::new(&workspace);
    linker
        .link_all(&plan.local_links)
        .context("Failed to link local projects")?;
    Ok(())
}
