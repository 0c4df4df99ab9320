//! Install command implementation
//!
//! Implements `monorail install`: synthesize the install plan, reconcile
//! the committed lockfile, drive the external installer, and link local
//! projects.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::cli::output;
use crate::config::defaults::{REPO_CONFIG_FILENAME, WORKING_LOCKFILE_PATH};
use crate::core::install_plan::{InstallPlan, LockfileVerdict};
use crate::core::installer::{InstallDriver, InstallMode, InstallOutcome};
use crate::core::linker::Linker;
use crate::core::policy::PolicySet;
use crate::core::repo_config::RepoConfig;
use crate::core::shrinkwrap::Shrinkwrap;
use crate::core::workspace::Workspace;
use crate::error::MonorailError;
use crate::infra::filesystem;

/// Install options
pub struct InstallOptions {
    /// Recycle the installed tree and caches before installing
    pub clean: bool,
    /// Additionally purge the installer tool itself
    pub full_clean: bool,
    /// Skip the approved-packages policy checks
    pub bypass_policy: bool,
    /// Do not create local project links after installing
    pub no_link: bool,
}

/// Execute the install command
pub async fn execute(repo_root: &Path, options: InstallOptions) -> Result<()> {
    let workspace = load_workspace(repo_root, options.bypass_policy)?;
    // Local ranges that no longer cover their project's version block
    // the install; run pending version bumps first
    workspace
        .validate_local_dependencies()
        .map_err(MonorailError::from)?;
    super::run_event_hooks("preInstall", &workspace.config.event_hooks.pre_install, repo_root);

    let plan = InstallPlan::compute(&workspace).context("Failed to compute the install plan")?;
    let summary = plan
        .write(repo_root)
        .context("Failed to write the install plan")?;
    tracing::info!(
        "Install plan written: {} stub(s) changed, manifest changed: {}",
        summary.stubs_rewritten,
        summary.manifest_rewritten
    );

    reconcile_lockfile(repo_root, &workspace, &plan)?;

    let mode = if options.full_clean {
        InstallMode::UnsafePurge
    } else if options.clean {
        InstallMode::ForceClean
    } else {
        InstallMode::Normal
    };
    let stub_paths: Vec<PathBuf> = plan
        .stubs
        .iter()
        .map(|stub| plan.stub_archive_path(repo_root, stub))
        .collect();

    let spinner = output::create_spinner("Installing dependencies...");
    let driver = InstallDriver::new(
        repo_root,
        &workspace.config.installer_tool_name,
        &workspace.config.installer_tool_version,
        mode,
    );
    let outcome = driver.run(&stub_paths);
    spinner.finish_and_clear();

    match outcome.context("Install failed")? {
        InstallOutcome::Skipped => {
            println!("{} Install is already up to date", output::status::SUCCESS);
        }
        InstallOutcome::Installed => {
            println!("{} Dependencies installed", output::status::SUCCESS);
        }
    }

    if !options.no_link {
        let linker = Linker::new(&workspace);
        let created = linker
            .link_all(&plan.local_links)
            .context("Failed to link local projects")?;
        println!("{} {created} local link(s) created", output::status::SUCCESS);
    }

    super::run_event_hooks("postInstall", &workspace.config.event_hooks.post_install, repo_root);
    Ok(())
}

/// Load the workspace, optionally bypassing the approval policy
pub(crate) fn load_workspace(repo_root: &Path, bypass_policy: bool) -> Result<Workspace> {
    if bypass_policy {
        let mut config = RepoConfig::load(&repo_root.join(REPO_CONFIG_FILENAME))
            .map_err(MonorailError::from)?;
        config.approved_packages_policy.enabled = false;
        let policies = PolicySet::load_for(repo_root).map_err(MonorailError::from)?;
        let workspace = Workspace::from_parts(repo_root.to_path_buf(), config, policies)
            .map_err(MonorailError::from)?;
        Ok(workspace)
    } else {
        Ok(Workspace::load(repo_root).map_err(MonorailError::from)?)
    }
}

/// Copy the committed lockfile into the working location when it is
/// valid; delete the working copy when it is not, forcing the installer
/// to re-resolve.
fn reconcile_lockfile(
    repo_root: &Path,
    workspace: &Workspace,
    plan: &InstallPlan,
) -> Result<()> {
    let committed = repo_root.join(&workspace.config.lockfile_path);
    let working = repo_root.join(WORKING_LOCKFILE_PATH);

    if !committed.exists() {
        tracing::warn!(
            "No committed lockfile at '{}'; the installer will resolve from scratch",
            committed.display()
        );
        filesystem::remove_file(&working).context("Failed to remove the working lockfile")?;
        return Ok(());
    }

    let mut shrinkwrap = Shrinkwrap::open(&committed).map_err(MonorailError::from)?;
    match plan.validate_lockfile(workspace, &mut shrinkwrap) {
        LockfileVerdict::Valid => {
            filesystem::copy_file(&committed, &working)
                .context("Failed to copy the lockfile into place")?;
            tracing::info!("Lockfile is valid");
        }
        LockfileVerdict::Invalid(reasons) => {
            println!(
                "{} Lockfile is out of date; the installer will re-resolve:",
                output::status::WARNING
            );
            for reason in &reasons {
                println!("  - {reason}");
            }
            filesystem::remove_file(&working).context("Failed to remove the working lockfile")?;
        }
    }
    Ok(())
}
