//! Local linking
//!
//! Materializes the install planner's local-link decisions: each
//! consumer's modules folder gains a symlink per locally-satisfied
//! dependency, transitively, so indirect local dependencies resolve
//! without a registry round-trip. A flag file records a completed link
//! pass; the installer invalidates it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::config::defaults::LAST_LINK_FLAG;
use crate::core::workspace::Workspace;
use crate::error::LinkError;
use crate::infra::filesystem;

/// Creates and removes local project links
#[derive(Debug)]
pub struct Linker<'a> {
    workspace: &'a Workspace,
}

impl<'a> Linker<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        Self { workspace }
    }

    /// Create every local link described by `local_links`, then record
    /// the pass in the link flag file.
    pub fn link_all(
        &self,
        local_links: &BTreeMap<String, BTreeSet<String>>,
    ) -> Result<usize, LinkError> {
        let mut created = 0;
        for project in &self.workspace.projects {
            let direct = local_links
                .get(&project.name)
                .cloned()
                .unwrap_or_default();
            created += self.link_project(&project.name, &direct)?;
        }

        let flag = self.workspace.root.join(LAST_LINK_FLAG);
        filesystem::touch_marker(&flag).map_err(|e| LinkError::Io {
            path: flag,
            error: e.to_string(),
        })?;
        Ok(created)
    }

    /// Link the transitive closure of `direct` into one consumer
    fn link_project(
        &self,
        consumer: &str,
        direct: &BTreeSet<String>,
    ) -> Result<usize, LinkError> {
        let consumer_project = self
            .workspace
            .project_by_name(consumer)
            .expect("consumer is a workspace project");
        let modules = consumer_project
            .abs_folder(&self.workspace.root)
            .join("node_modules");

        // Indirect local dependencies are linked flat into the same
        // modules folder, matching how the shared install hoists them.
        let mut to_link = BTreeSet::new();
        let mut stack: Vec<String> = direct.iter().cloned().collect();
        while let Some(name) = stack.pop() {
            if !to_link.insert(name.clone()) {
                continue;
            }
            let project = self
                .workspace
                .project_by_name(&name)
                .expect("linked names are workspace projects");
            for dep in self
                .workspace
                .local_dependencies_of(project)
                .map_err(|e| LinkError::Io {
                    path: self.workspace.root.clone(),
                    error: e.to_string(),
                })?
            {
                if !to_link.contains(&dep) {
                    stack.push(dep);
                }
            }
        }

        let mut created = 0;
        for name in &to_link {
            let target = self
                .workspace
                .project_by_name(name)
                .expect("linked names are workspace projects")
                .abs_folder(&self.workspace.root);
            let link = scoped_link_path(&modules, name);
            filesystem::symlink_dir(&target, &link).map_err(|e| LinkError::Symlink {
                consumer: consumer.to_string(),
                target: name.clone(),
                error: e.to_string(),
            })?;
            created += 1;
        }
        Ok(created)
    }

    /// Remove all local links and the link flag
    pub fn unlink_all(&self) -> Result<(), LinkError> {
        for project in &self.workspace.projects {
            let modules = project.abs_folder(&self.workspace.root).join("node_modules");
            for other in &self.workspace.projects {
                let link = scoped_link_path(&modules, &other.name);
                if std::fs::symlink_metadata(&link).is_ok() {
                    remove_link(&link).map_err(|e| LinkError::Io {
                        path: link,
                        error: e.to_string(),
                    })?;
                }
            }
        }
        let flag = self.workspace.root.join(LAST_LINK_FLAG);
        filesystem::remove_file(&flag).map_err(|e| LinkError::Io {
            path: flag,
            error: e.to_string(),
        })?;
        Ok(())
    }
}

/// `node_modules/@scope/name` for scoped packages, `node_modules/name`
/// otherwise
fn scoped_link_path(modules: &Path, package_name: &str) -> std::path::PathBuf {
    let mut path = modules.to_path_buf();
    for part in package_name.split('/') {
        path.push(part);
    }
    path
}

fn remove_link(link: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        std::fs::remove_file(link)
    }
    #[cfg(windows)]
    {
        std::fs::remove_dir(link)
    }
}
