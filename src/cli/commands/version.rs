//! Version command implementation
//!
//! Implements `monorail version`: ensure every policy member is at the
//! version its policy demands, optionally bumping lock-step policies
//! first.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::cli::output;
use crate::config::defaults::VERSION_POLICY_PATH;
use crate::core::policy::BumpType;
use crate::core::workspace::Workspace;
use crate::error::MonorailError;

/// Version options
pub struct VersionOptions {
    /// Bump lock-step policies before ensuring members
    pub bump: bool,
    /// Bump only this policy
    pub version_policy: Option<String>,
    /// Override the policy's configured bump kind
    pub override_bump: Option<String>,
    /// Prerelease identifier for prerelease bumps
    pub override_prerelease_id: Option<String>,
}

/// Execute the version command
pub async fn execute(repo_root: &Path, options: VersionOptions) -> Result<()> {
    let mut workspace = Workspace::load(repo_root).map_err(MonorailError::from)?;

    if options.bump {
        let override_bump = options
            .override_bump
            .as_deref()
            .map(parse_bump)
            .transpose()?;
        let preid = options.override_prerelease_id.as_deref();

        let mut bumped = 0;
        for policy in workspace.policies.iter_mut() {
            if let Some(only) = &options.version_policy {
                if policy.name() != only {
                    continue;
                }
            }
            policy.bump(override_bump, preid)?;
            bumped += 1;
        }
        if bumped == 0 {
            bail!("No version policy matched");
        }

        let policy_path = repo_root.join(VERSION_POLICY_PATH);
        workspace
            .policies
            .save(&policy_path)
            .context("Failed to save version policies")?;
        println!("{} {bumped} policy(ies) bumped", output::status::SUCCESS);
    }

    // Ensure every member project agrees with its policy
    let mut rewritten = 0;
    let project_names: Vec<String> =
        workspace.projects.iter().map(|p| p.name.clone()).collect();
    for name in project_names {
        let project = workspace
            .project_by_name(&name)
            .expect("iterating workspace projects");
        let Some(policy_name) = project.version_policy_name.clone() else {
            continue;
        };
        let policy = workspace
            .policies
            .get(&policy_name)
            .expect("policy references were validated at load")
            .clone();

        if let Some(updated) = policy.ensure(&project.manifest)? {
            let manifest_path = project.manifest_path(repo_root);
            updated.save(&manifest_path)?;
            let new_version = updated.version.clone();
            workspace
                .project_by_name_mut(&name)
                .expect("iterating workspace projects")
                .manifest = updated;
            println!("  {name} -> {new_version}");
            rewritten += 1;
        }
    }

    if rewritten == 0 {
        println!("{} All project versions conform to policy", output::status::SUCCESS);
    } else {
        println!("{} {rewritten} manifest(s) rewritten", output::status::SUCCESS);
    }
    Ok(())
}

fn parse_bump(text: &str) -> Result<BumpType> {
    Ok(match text {
        "none" => BumpType::None,
        "prerelease" => BumpType::Prerelease,
        "patch" => BumpType::Patch,
        "preminor" => BumpType::Preminor,
        "minor" => BumpType::Minor,
        "major" => BumpType::Major,
        other => bail!("Unknown bump kind '{other}' (expected none, prerelease, patch, preminor, minor, or major)"),
    })
}
