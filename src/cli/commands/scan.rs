//! Scan command implementation
//!
//! Implements `monorail scan`: report which projects would rebuild on
//! the next `monorail build` by comparing fresh fingerprints against the
//! persisted ones. No scripts run and nothing is written.

use std::path::Path;

use anyhow::Result;

use crate::cli::output;
use crate::core::build_task::BuildFlags;
use crate::core::change_hash::ProjectFingerprint;
use crate::core::workspace::Workspace;
use crate::error::MonorailError;

/// Execute the scan command
pub async fn execute(repo_root: &Path) -> Result<()> {
    let workspace = Workspace::load(repo_root).map_err(MonorailError::from)?;

    let mut stale = Vec::new();
    let mut fresh = 0usize;
    for project in &workspace.projects {
        let folder = project.abs_folder(repo_root);

        // The fingerprint identity includes the command line the build
        // would run with default flags
        let command = match (
            project.manifest.script("test"),
            project.manifest.script("build"),
        ) {
            (Some(script), _) | (None, Some(script)) => {
                let mut command = script.to_string();
                BuildFlags {
                    color: true,
                    ..BuildFlags::default()
                }
                .append_to_command(&mut command);
                command
            }
            (None, None) => {
                stale.push((project.name.clone(), "no build or test script".to_string()));
                continue;
            }
        };

        match (
            ProjectFingerprint::compute(&folder, &command),
            ProjectFingerprint::load(&folder),
        ) {
            (Ok(current), Some(previous)) if current.matches(&previous) => fresh += 1,
            (Ok(_), Some(_)) => stale.push((project.name.clone(), "inputs changed".to_string())),
            (Ok(_), None) => stale.push((project.name.clone(), "never built".to_string())),
            (Err(e), _) => stale.push((project.name.clone(), e.to_string())),
        }
    }

    if stale.is_empty() {
        println!(
            "{} All {} project(s) are up to date",
            output::status::SUCCESS,
            fresh
        );
    } else {
        println!("{} project(s) would rebuild:", stale.len());
        for (name, reason) in &stale {
            println!("  {name} ({reason})");
        }
    }
    Ok(())
}
