//! Check command implementation
//!
//! Implements `monorail check`: validate the repository configuration
//! and every project manifest without side effects, reporting all errors
//! found rather than stopping at the first.

use std::path::Path;

use anyhow::{bail, Result};

use crate::cli::output;
use crate::config::defaults::REPO_CONFIG_FILENAME;
use crate::core::package_json::PackageManifest;
use crate::core::policy::PolicySet;
use crate::core::repo_config::RepoConfig;
use crate::core::workspace::Workspace;

/// Execute the check command
pub async fn execute(repo_root: &Path) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    let config = match RepoConfig::load(&repo_root.join(REPO_CONFIG_FILENAME)) {
        Ok(config) => config,
        Err(e) => bail!("{e}"),
    };

    if let Err(config_errors) = config.validate() {
        errors.extend(config_errors);
    }

    // Per-project manifest checks that the repository manifest alone
    // cannot decide
    for project in &config.projects {
        let manifest_path = repo_root.join(&project.project_folder).join("package.json");
        if !manifest_path.exists() {
            errors.push(format!(
                "Project '{}' has no manifest at '{}'",
                project.package_name,
                manifest_path.display()
            ));
            continue;
        }
        match PackageManifest::load(&manifest_path) {
            Ok(manifest) => {
                if manifest.name != project.package_name {
                    errors.push(format!(
                        "Project '{}' declares manifest name '{}'",
                        project.package_name, manifest.name
                    ));
                }
                if semver::Version::parse(&manifest.version).is_err() {
                    errors.push(format!(
                        "Project '{}' has invalid version '{}'",
                        project.package_name, manifest.version
                    ));
                }
                if let Some(policy) = &project.version_policy_name {
                    let policies = PolicySet::load_for(repo_root)?;
                    if policies.get(policy).is_none() {
                        errors.push(format!(
                            "Project '{}' references unknown version policy '{}'",
                            project.package_name, policy
                        ));
                    }
                }
            }
            Err(e) => errors.push(e.to_string()),
        }
    }

    // The full load exercises the cross-project invariants (cycles,
    // temp-name bijection); the install-flow gate covers local ranges
    if errors.is_empty() {
        match Workspace::load(repo_root) {
            Ok(workspace) => {
                if let Err(e) = workspace.validate_local_dependencies() {
                    errors.push(e.to_string());
                }
            }
            Err(e) => errors.push(e.to_string()),
        }
    }

    if errors.is_empty() {
        println!(
            "{} Repository configuration is valid ({} project(s))",
            output::status::SUCCESS,
            config.projects.len()
        );
        Ok(())
    } else {
        for error in &errors {
            eprintln!("{} {error}", output::status::ERROR);
        }
        bail!("{} validation error(s) found", errors.len());
    }
}
