//! Installer driver
//!
//! Drives the external package installer over the synthesized common
//! manifest. The success-marker file doubles as a transaction log: it is
//! deleted before any mutation and re-created only after the installer
//! succeeds, so a crash mid-install forces a clean install on the next
//! run.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::defaults::{
    COMMON_MODULES_FOLDER, COMMON_TEMP_FOLDER, LAST_INSTALL_FLAG, LAST_LINK_FLAG,
    MAX_INSTALL_ATTEMPTS, RECYCLER_FOLDER, TEMP_SCOPE, WORKING_LOCKFILE_PATH,
};
use crate::error::InstallError;
use crate::infra::filesystem;
use crate::infra::process;
use crate::infra::recycler::Recycler;

/// How aggressively the install should reset state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallMode {
    /// Incremental prune+install when the previous install succeeded
    #[default]
    Normal,
    /// Also recycle the install cache and scratch folders
    ForceClean,
    /// Additionally reinstall the installer tool itself
    UnsafePurge,
}

/// Outcome of one driver run
#[derive(Debug, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Nothing newer than the success marker; nothing ran
    Skipped,
    /// The installer ran and succeeded
    Installed,
}

/// Paths and knobs for one install run
#[derive(Debug)]
pub struct InstallDriver {
    repo_root: PathBuf,
    tool_name: String,
    tool_version: String,
    /// `<tool> install` command line, built from the repo config
    install_command: String,
    /// `<tool> prune` command line
    prune_command: String,
    mode: InstallMode,
}

impl InstallDriver {
    pub fn new(
        repo_root: &Path,
        installer_tool: &str,
        installer_version: &str,
        mode: InstallMode,
    ) -> Self {
        Self {
            repo_root: repo_root.to_path_buf(),
            tool_name: installer_tool.to_string(),
            tool_version: installer_version.to_string(),
            install_command: format!("{installer_tool} install"),
            prune_command: format!("{installer_tool} prune"),
            mode,
        }
    }

    fn marker_path(&self) -> PathBuf {
        self.repo_root.join(LAST_INSTALL_FLAG)
    }

    fn modules_folder(&self) -> PathBuf {
        self.repo_root.join(COMMON_MODULES_FOLDER)
    }

    fn common_temp(&self) -> PathBuf {
        self.repo_root.join(COMMON_TEMP_FOLDER)
    }

    /// Per-user cache folder for the installer tool
    pub fn tool_cache_folder(installer_tool: &str, version: &str) -> Option<PathBuf> {
        dirs::home_dir().map(|home| {
            home.join(".monorail")
                .join(format!("{installer_tool}-{version}"))
        })
    }

    /// Is any install input newer than the success marker?
    ///
    /// Inputs: the shared modules folder, the working lockfile copy, and
    /// every stub archive. Without a marker the answer is always yes.
    pub fn is_install_required(&self, stub_archives: &[PathBuf]) -> bool {
        let Some(marker_time) = filesystem::mtime(&self.marker_path()) else {
            return true;
        };

        let mut inputs: Vec<PathBuf> = vec![
            self.modules_folder(),
            self.repo_root.join(WORKING_LOCKFILE_PATH),
        ];
        inputs.extend_from_slice(stub_archives);

        inputs.iter().any(|path| newer_than(path, marker_time))
    }

    /// Run the install, honoring the mode.
    ///
    /// `had_prior_success` should be captured before the caller mutates
    /// any state; the driver deletes the marker as its first act.
    pub fn run(&self, stub_archives: &[PathBuf]) -> Result<InstallOutcome, InstallError> {
        if self.mode == InstallMode::Normal && !self.is_install_required(stub_archives) {
            tracing::info!("Install is up to date; skipping");
            return Ok(InstallOutcome::Skipped);
        }

        let had_prior_success = self.marker_path().exists();

        // The marker is the transaction start: delete it first so an
        // interrupted run cannot masquerade as a finished one.
        filesystem::remove_file(&self.marker_path()).map_err(|e| InstallError::Io {
            path: self.marker_path(),
            error: e.to_string(),
        })?;
        // A fresh install also invalidates the link pass
        let _ = filesystem::remove_file(&self.repo_root.join(LAST_LINK_FLAG));

        let mut recycler = Recycler::new(self.repo_root.join(RECYCLER_FOLDER));
        self.prepare_folders(had_prior_success, &mut recycler)?;

        // Overlap folder teardown with the expensive install
        recycler.start_cleanup();

        let cwd = self.common_temp();
        filesystem::create_dir_all(&cwd).map_err(|e| InstallError::Io {
            path: cwd.clone(),
            error: e.to_string(),
        })?;
        process::run_shell_with_retries(&self.install_command, &cwd, MAX_INSTALL_ATTEMPTS)?;

        recycler.drain();
        filesystem::touch_marker(&self.marker_path()).map_err(|e| InstallError::Io {
            path: self.marker_path(),
            error: e.to_string(),
        })?;
        Ok(InstallOutcome::Installed)
    }

    fn prepare_folders(
        &self,
        had_prior_success: bool,
        recycler: &mut Recycler,
    ) -> Result<(), InstallError> {
        let modules = self.modules_folder();

        match self.mode {
            InstallMode::Normal if had_prior_success => {
                // Incremental path: prune extraneous packages, then drop
                // the temp-scope entries. The installer does not notice
                // content changes behind `file:` specifiers, so the stub
                // tree must be re-extracted every time.
                if modules.exists() {
                    let cwd = self.common_temp();
                    if let Ok(output) = process::run_shell(&self.prune_command, &cwd) {
                        if !output.success() {
                            tracing::warn!("Prune failed; continuing with install");
                        }
                    }
                    self.remove_temp_scope_entries(recycler)?;
                }
            }
            InstallMode::Normal => {
                // No marker: the previous install crashed partway. The
                // whole modules tree is suspect.
                recycle(recycler, &modules)?;
            }
            InstallMode::ForceClean | InstallMode::UnsafePurge => {
                recycle(recycler, &modules)?;
                recycle(recycler, &self.common_temp().join("install-cache"))?;
                recycle(recycler, &self.common_temp().join("staging"))?;
                if self.mode == InstallMode::UnsafePurge {
                    // The per-user tool folder lives on another volume;
                    // rename-into-recycler may not apply, so delete in place.
                    tracing::warn!("Purging the installer tool; it will be re-provisioned");
                    if let Some(tool) =
                        Self::tool_cache_folder(&self.tool_name, &self.tool_version)
                    {
                        let _ = filesystem::remove_dir_all(&tool);
                    }
                }
            }
        }
        Ok(())
    }

    /// Delete every `@mono-tmp` entry in the installed tree
    fn remove_temp_scope_entries(&self, recycler: &mut Recycler) -> Result<(), InstallError> {
        let scope_folder = self.modules_folder().join(TEMP_SCOPE);
        recycle(recycler, &scope_folder)
    }
}

fn recycle(recycler: &mut Recycler, folder: &Path) -> Result<(), InstallError> {
    recycler.discard(folder).map_err(|e| InstallError::Io {
        path: folder.to_path_buf(),
        error: e.to_string(),
    })
}

fn newer_than(path: &Path, reference: SystemTime) -> bool {
    match filesystem::mtime(path) {
        Some(time) => time > reference,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn driver(root: &Path) -> InstallDriver {
        InstallDriver::new(root, "true", "1.0.0", InstallMode::Normal)
    }

    #[test]
    fn test_install_required_without_marker() {
        let tmp = TempDir::new().unwrap();
        assert!(driver(tmp.path()).is_install_required(&[]));
    }

    #[test]
    fn test_skip_when_marker_is_newest() {
        let tmp = TempDir::new().unwrap();
        let d = driver(tmp.path());
        let stub = tmp.path().join("common/temp/projects/a.tgz");
        filesystem::write_file(&stub, b"stub").unwrap();
        filesystem::touch_marker(&tmp.path().join(LAST_INSTALL_FLAG)).unwrap();

        // The stub predates the marker, so nothing to do
        assert!(!d.is_install_required(&[stub.clone()]));
        assert_eq!(d.run(&[stub]).unwrap(), InstallOutcome::Skipped);
    }

    #[test]
    fn test_stale_stub_triggers_install() {
        let tmp = TempDir::new().unwrap();
        let d = driver(tmp.path());
        filesystem::touch_marker(&tmp.path().join(LAST_INSTALL_FLAG)).unwrap();

        // Give the filesystem clock a beat, then touch the stub
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let stub = tmp.path().join("common/temp/projects/a.tgz");
        filesystem::write_file(&stub, b"stub").unwrap();

        assert!(d.is_install_required(&[stub]));
    }

    #[test]
    fn test_run_recreates_marker_and_invalidates_link_flag() {
        let tmp = TempDir::new().unwrap();
        let d = driver(tmp.path());
        filesystem::touch_marker(&tmp.path().join(LAST_LINK_FLAG)).unwrap();

        let outcome = d.run(&[]).unwrap();
        assert_eq!(outcome, InstallOutcome::Installed);
        assert!(tmp.path().join(LAST_INSTALL_FLAG).exists());
        assert!(
            !tmp.path().join(LAST_LINK_FLAG).exists(),
            "an install invalidates the link pass"
        );
    }

    #[test]
    fn test_failed_installer_leaves_no_marker() {
        let tmp = TempDir::new().unwrap();
        let d = InstallDriver::new(tmp.path(), "false", "1.0.0", InstallMode::Normal);
        assert!(d.run(&[]).is_err());
        assert!(!tmp.path().join(LAST_INSTALL_FLAG).exists());
    }

    #[test]
    fn test_dirty_tree_recycled_without_marker() {
        let tmp = TempDir::new().unwrap();
        let modules = tmp.path().join(COMMON_MODULES_FOLDER);
        std::fs::create_dir_all(modules.join("left-behind")).unwrap();

        let d = driver(tmp.path());
        d.run(&[]).unwrap();
        assert!(!modules.exists(), "crashed install leftovers are removed");
    }
}
