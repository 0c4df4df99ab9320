//! Build command implementation
//!
//! Implements `monorail build` and `monorail rebuild`: select projects,
//! wire the task graph, and hand it to the scheduler.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::core::build_task::{BuildFlags, BuildTask};
use crate::core::diagnostics::DisplayMode;
use crate::core::scheduler::TaskScheduler;
use crate::core::workspace::Workspace;
use crate::error::MonorailError;

/// Build options
pub struct BuildOptions {
    /// Build only this project and its dependencies
    pub to: Option<String>,
    /// Build only this project and its dependents
    pub from: Option<String>,
    /// Maximum concurrent project builds (0 = CPU count)
    pub parallelism: usize,
    pub production: bool,
    pub npm: bool,
    pub minimal: bool,
    /// Emit CI issue-linked diagnostics
    pub vso: bool,
    /// Ignore fingerprints and rebuild everything
    pub clean: bool,
}

/// Execute the build command
pub async fn execute(repo_root: &Path, options: BuildOptions) -> Result<()> {
    let workspace = Workspace::load(repo_root).map_err(MonorailError::from)?;
    super::run_event_hooks("preBuild", &workspace.config.event_hooks.pre_build, repo_root);

    let selection = select_projects(&workspace, &options)?;
    if selection.is_empty() {
        bail!("No projects selected");
    }
    tracing::info!("Building {} project(s)", selection.len());

    let display_mode = if options.vso {
        DisplayMode::CiLinked
    } else {
        DisplayMode::Local
    };
    let mut scheduler = TaskScheduler::new(options.parallelism, display_mode);

    let flags = BuildFlags {
        production: options.production,
        npm: options.npm,
        minimal: options.minimal,
        color: !options.vso,
    };

    for name in &selection {
        let project = workspace
            .project_by_name(name)
            .expect("selection names are workspace projects");
        let task = BuildTask::new(
            &project.name,
            project.abs_folder(repo_root),
            project.manifest.script("clean").map(str::to_string),
            project.manifest.script("test").map(str::to_string),
            project.manifest.script("build").map(str::to_string),
            flags.clone(),
            !options.clean,
        );
        scheduler.add_task(&project.name, Arc::new(task))?;
    }

    // Only edges inside the selection constrain scheduling
    for name in &selection {
        let project = workspace
            .project_by_name(name)
            .expect("selection names are workspace projects");
        let deps: Vec<String> = workspace
            .local_dependencies_of(project)?
            .into_iter()
            .filter(|dep| selection.contains(dep))
            .collect();
        let dep_refs: Vec<&str> = deps.iter().map(String::as_str).collect();
        scheduler.add_dependencies(&project.name, &dep_refs)?;
    }

    let result = scheduler.execute().await;
    super::run_event_hooks("postBuild", &workspace.config.event_hooks.post_build, repo_root);
    result.context("Build failed")?;
    Ok(())
}

/// Resolve --to/--from into the set of project names to build
fn select_projects(workspace: &Workspace, options: &BuildOptions) -> Result<BTreeSet<String>> {
    let graph = workspace.local_graph()?;

    if let Some(to) = &options.to {
        let project = workspace
            .find_project(to)
            .with_context(|| format!("Project '{to}' not found in the workspace"))?;
        let mut selection = graph.transitive_dependencies(&project.name);
        selection.insert(project.name.clone());
        return Ok(selection);
    }

    if let Some(from) = &options.from {
        let project = workspace
            .find_project(from)
            .with_context(|| format!("Project '{from}' not found in the workspace"))?;
        let mut selection = graph.transitive_dependents(&project.name);
        selection.insert(project.name.clone());
        return Ok(selection);
    }

    Ok(workspace
        .projects
        .iter()
        .map(|p| p.name.clone())
        .collect())
}
