//! Workspace model
//!
//! Loads the repository manifest and every project manifest, validates the
//! cross-project invariants, and exposes the indices the rest of the tool
//! works from: `by_name`, `by_temp_name`, shorthand lookup, and the
//! downstream adjacency of the local dependency graph.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use semver::Version;

use crate::config::defaults::{REPO_CONFIG_FILENAME, TEMP_SCOPE};
use crate::core::graph::ProjectGraph;
use crate::core::package_json::{unscope, PackageManifest};
use crate::core::policy::PolicySet;
use crate::core::ranges;
use crate::core::repo_config::RepoConfig;
use crate::error::WorkspaceError;

/// One project in the workspace
#[derive(Debug, Clone)]
pub struct Project {
    /// Package name; equals `manifest.name`
    pub name: String,

    /// Folder relative to the repository root
    pub folder: PathBuf,

    /// Review category under the approved-packages policy
    pub review_category: Option<String>,

    /// Local dependency names that must not be linked (cycle breakers)
    pub cyclic_exemptions: HashSet<String>,

    /// Reference into the policy registry
    pub version_policy_name: Option<String>,

    /// Whether this project is published
    pub should_publish: bool,

    /// The loaded package manifest
    pub manifest: PackageManifest,

    /// Synthetic unique name under the reserved temp scope
    pub temp_name: String,
}

impl Project {
    /// Absolute folder path given the repository root
    pub fn abs_folder(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.folder)
    }

    /// Absolute path of this project's package manifest
    pub fn manifest_path(&self, repo_root: &Path) -> PathBuf {
        self.abs_folder(repo_root).join("package.json")
    }

    /// The unscoped portion of the temp name (`@mono-tmp/foo` -> `foo`)
    pub fn unscoped_temp_name(&self) -> &str {
        unscope(&self.temp_name)
    }

    /// Parsed manifest version
    pub fn version(&self) -> Result<Version, WorkspaceError> {
        ranges::parse_version(&self.manifest.version).map_err(|e| {
            WorkspaceError::ProjectManifest {
                project: self.name.clone(),
                error: e.to_string(),
            }
        })
    }
}

/// The loaded and validated workspace
#[derive(Debug)]
pub struct Workspace {
    /// Repository root path
    pub root: PathBuf,

    /// Repository manifest
    pub config: RepoConfig,

    /// Projects in declaration order
    pub projects: Vec<Project>,

    /// Version policies referenced by projects
    pub policies: PolicySet,

    /// Index: package name -> position in `projects`
    by_name: HashMap<String, usize>,

    /// Index: temp name -> position in `projects`
    by_temp_name: HashMap<String, usize>,

    /// Downstream adjacency: name -> projects that locally depend on it
    downstream: BTreeMap<String, BTreeSet<String>>,
}

impl Workspace {
    /// Load the workspace rooted at `repo_root`.
    ///
    /// Fails on the first configuration error; use [`RepoConfig::validate`]
    /// for the exhaustive report the `check` verb prints.
    pub fn load(repo_root: &Path) -> Result<Self, WorkspaceError> {
        let config = RepoConfig::load(&repo_root.join(REPO_CONFIG_FILENAME))?;
        let policies = PolicySet::load_for(repo_root).map_err(|e| {
            WorkspaceError::ConfigInvalid {
                message: e.to_string(),
            }
        })?;
        Self::from_parts(repo_root.to_path_buf(), config, policies)
    }

    /// Assemble a workspace from an already-parsed configuration.
    pub fn from_parts(
        root: PathBuf,
        config: RepoConfig,
        policies: PolicySet,
    ) -> Result<Self, WorkspaceError> {
        if let Err(errors) = config.validate() {
            return Err(WorkspaceError::ConfigInvalid {
                message: errors.join("; "),
            });
        }

        let mut projects = Vec::with_capacity(config.projects.len());
        let mut by_name = HashMap::new();
        let mut by_temp_name = HashMap::new();
        let mut unscoped_owner: HashMap<String, String> = HashMap::new();

        for entry in &config.projects {
            let folder = PathBuf::from(&entry.project_folder);
            let abs_folder = root.join(&folder);
            if !abs_folder.is_dir() {
                return Err(WorkspaceError::FolderMissing {
                    project: entry.package_name.clone(),
                    folder: abs_folder,
                });
            }

            let manifest = PackageManifest::load(&abs_folder.join("package.json"))?;
            if manifest.name != entry.package_name {
                return Err(WorkspaceError::NameMismatch {
                    project: entry.package_name.clone(),
                    manifest_name: manifest.name.clone(),
                });
            }

            if let Some(policy) = &entry.version_policy_name {
                if policies.get(policy).is_none() {
                    return Err(WorkspaceError::UnknownPolicy {
                        project: entry.package_name.clone(),
                        policy: policy.clone(),
                    });
                }
            }

            let unscoped = unscope(&entry.package_name).to_string();
            if let Some(owner) = unscoped_owner.get(&unscoped) {
                return Err(WorkspaceError::TempNameCollision {
                    first: owner.clone(),
                    second: entry.package_name.clone(),
                    unscoped,
                });
            }
            unscoped_owner.insert(unscoped.clone(), entry.package_name.clone());

            let temp_name = format!("{TEMP_SCOPE}/{unscoped}");
            let project = Project {
                name: entry.package_name.clone(),
                folder,
                review_category: entry.review_category.clone(),
                cyclic_exemptions: entry
                    .cyclic_dependency_projects
                    .iter()
                    .cloned()
                    .collect(),
                version_policy_name: entry.version_policy_name.clone(),
                should_publish: entry.is_published(),
                manifest,
                temp_name,
            };

            // Duplicate names were rejected by config.validate()
            let index = projects.len();
            by_name.insert(project.name.clone(), index);
            by_temp_name.insert(project.temp_name.clone(), index);
            projects.push(project);
        }

        let mut workspace = Self {
            root,
            config,
            projects,
            policies,
            by_name,
            by_temp_name,
            downstream: BTreeMap::new(),
        };
        // Cycles are judged on the declared non-exempt edges; a lagging
        // range must not hide one
        workspace.declared_graph().topological_sort()?;
        let graph = workspace.local_graph()?;
        workspace.downstream = graph.downstream();
        Ok(workspace)
    }

    /// Graph of every declared, non-exempt local dependency edge,
    /// including edges whose range lags the local version.
    fn declared_graph(&self) -> ProjectGraph {
        let mut graph = ProjectGraph::new();
        for project in &self.projects {
            let deps: Vec<String> = project
                .manifest
                .deps_and_dev_deps()
                .filter(|(dep, _)| !project.cyclic_exemptions.contains(*dep))
                .filter_map(|(dep, _)| self.project_by_name(dep))
                .map(|local| local.name.clone())
                .collect();
            graph.add_project(&project.name, deps);
        }
        graph
    }

    /// Every local dependency must be cyclic-exempt or range-satisfied.
    ///
    /// This gates the install flow, not workspace loading: the version
    /// flow must still be able to open a workspace whose declared ranges
    /// lag behind a local project's current version, since applying the
    /// pending bumps is exactly what brings them back in line.
    pub fn validate_local_dependencies(&self) -> Result<(), WorkspaceError> {
        for project in &self.projects {
            for (dep, range) in project.manifest.deps_and_dev_deps() {
                let Some(local) = self.project_by_name(dep) else {
                    continue;
                };
                if project.cyclic_exemptions.contains(dep) {
                    continue;
                }
                if !ranges::is_semver_specifier(range) {
                    continue;
                }
                let version = local.version()?;
                let ok = ranges::satisfies(&version, range).map_err(|e| {
                    WorkspaceError::ProjectManifest {
                        project: project.name.clone(),
                        error: e.to_string(),
                    }
                })?;
                if !ok {
                    return Err(WorkspaceError::LocalRangeUnsatisfied {
                        project: project.name.clone(),
                        dependency: dep.to_string(),
                        range: range.to_string(),
                        version: local.manifest.version.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Graph of non-exempt, range-satisfied local dependency edges
    pub fn local_graph(&self) -> Result<ProjectGraph, WorkspaceError> {
        let mut graph = ProjectGraph::new();
        for project in &self.projects {
            let deps = self.local_dependencies_of(project)?;
            graph.add_project(&project.name, deps);
        }
        Ok(graph)
    }

    /// Names of the local projects `project` depends on through linkable edges
    pub fn local_dependencies_of(&self, project: &Project) -> Result<Vec<String>, WorkspaceError> {
        let mut deps = Vec::new();
        for (dep, range) in project.manifest.deps_and_dev_deps() {
            let Some(local) = self.project_by_name(dep) else {
                continue;
            };
            if project.cyclic_exemptions.contains(dep) {
                continue;
            }
            if ranges::is_semver_specifier(range) {
                let version = local.version()?;
                let ok = ranges::satisfies(&version, range).unwrap_or(false);
                if !ok {
                    continue;
                }
            }
            if !deps.contains(&local.name) {
                deps.push(local.name.clone());
            }
        }
        Ok(deps)
    }

    /// Look up a project by its package name
    pub fn project_by_name(&self, name: &str) -> Option<&Project> {
        self.by_name.get(name).map(|&i| &self.projects[i])
    }

    /// Look up a project by its temp name
    pub fn project_by_temp_name(&self, temp_name: &str) -> Option<&Project> {
        self.by_temp_name.get(temp_name).map(|&i| &self.projects[i])
    }

    /// Shorthand lookup: exact name, or a bare name that is the unique
    /// unscoped suffix among scoped projects.
    pub fn find_project(&self, shorthand: &str) -> Option<&Project> {
        if let Some(project) = self.project_by_name(shorthand) {
            return Some(project);
        }
        let mut matched = None;
        for project in &self.projects {
            if project.manifest.unscoped_name() == shorthand {
                if matched.is_some() {
                    return None; // ambiguous
                }
                matched = Some(project);
            }
        }
        matched
    }

    /// Projects that directly depend on `name` through linkable local edges
    pub fn downstream_of(&self, name: &str) -> &BTreeSet<String> {
        static EMPTY: std::sync::OnceLock<BTreeSet<String>> = std::sync::OnceLock::new();
        self.downstream
            .get(name)
            .unwrap_or_else(|| EMPTY.get_or_init(BTreeSet::new))
    }

    /// The full downstream adjacency
    pub fn downstream(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.downstream
    }

    /// Projects whose manifests directly declare a dependency on `name`,
    /// excluding cyclic exemptions.
    ///
    /// Unlike [`Workspace::downstream_of`], this keeps edges whose
    /// declared range does not cover the local version; the version flow
    /// must visit exactly those dependents to repair their ranges.
    /// Exempted edges stay out: they are satisfied from the registry, so
    /// a local bump reaches them only through a published release.
    pub fn manifest_dependents_of(&self, name: &str) -> BTreeSet<String> {
        self.projects
            .iter()
            .filter(|p| !p.cyclic_exemptions.contains(name))
            .filter(|p| {
                p.manifest.dependencies.contains_key(name)
                    || p.manifest.dev_dependencies.contains_key(name)
            })
            .map(|p| p.name.clone())
            .collect()
    }

    /// Mutable access for the version flow's manifest rewrites
    pub fn project_by_name_mut(&mut self, name: &str) -> Option<&mut Project> {
        let index = *self.by_name.get(name)?;
        Some(&mut self.projects[index])
    }
}
