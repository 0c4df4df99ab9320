//! Repository manifest (monorail.json) parsing and validation
//!
//! The repository manifest declares every project in the monorepo along
//! with repository-wide policy: installer tool pin, committed lockfile
//! path, folder-depth bounds, the approved-packages policy, and event
//! hooks. Validation reports all errors found, not just the first one.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::WorkspaceError;

/// The repository manifest (monorail.json)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RepoConfig {
    /// External installer tool name (e.g. "npm")
    pub installer_tool_name: String,

    /// Exact installer tool version
    pub installer_tool_version: String,

    /// Committed lockfile path, relative to the repository root
    pub lockfile_path: String,

    /// Registered projects
    pub projects: Vec<ProjectConfig>,

    /// Allowed contributor email regex patterns
    #[serde(default)]
    pub allowed_email_patterns: Vec<String>,

    /// Minimum allowed project-folder depth
    #[serde(default = "default_min_depth")]
    pub project_folder_min_depth: usize,

    /// Maximum allowed project-folder depth
    #[serde(default = "default_max_depth")]
    pub project_folder_max_depth: usize,

    /// Approved-packages review policy
    #[serde(default)]
    pub approved_packages_policy: ApprovedPackagesPolicy,

    /// Commands run around the install and build flows
    #[serde(default)]
    pub event_hooks: EventHooks,

    /// Operator-declared version pins, overriding implicit pins
    #[serde(default)]
    pub pinned_versions: BTreeMap<String, String>,

    /// Opt-in usage telemetry
    #[serde(default)]
    pub telemetry_enabled: bool,
}

fn default_min_depth() -> usize {
    1
}

fn default_max_depth() -> usize {
    2
}

/// One project entry in the repository manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectConfig {
    /// Package name; must match the project's manifest name
    pub package_name: String,

    /// Folder relative to the repository root
    pub project_folder: String,

    /// Review category, required when the approval policy is enabled
    #[serde(default)]
    pub review_category: Option<String>,

    /// Local dependency names that must NOT be linked (cycle breakers)
    #[serde(default)]
    pub cyclic_dependency_projects: Vec<String>,

    /// Reference into the version policy registry
    #[serde(default)]
    pub version_policy_name: Option<String>,

    /// Whether the package is published; implied by a version policy
    #[serde(default)]
    pub should_publish: bool,
}

/// Approved-packages review policy
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApprovedPackagesPolicy {
    /// Whether the policy is enforced
    #[serde(default)]
    pub enabled: bool,

    /// The declared review categories
    #[serde(default)]
    pub review_categories: Vec<String>,
}

/// Commands run around the install and build flows
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventHooks {
    #[serde(default)]
    pub pre_install: Vec<String>,
    #[serde(default)]
    pub post_install: Vec<String>,
    #[serde(default)]
    pub pre_build: Vec<String>,
    #[serde(default)]
    pub post_build: Vec<String>,
}

impl RepoConfig {
    /// Load the repository manifest from a file path
    pub fn load(path: &Path) -> Result<Self, WorkspaceError> {
        if !path.exists() {
            return Err(WorkspaceError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| WorkspaceError::ConfigParse {
            error: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|e| WorkspaceError::ConfigParse {
            error: e.to_string(),
        })
    }

    /// Parse from a JSON string
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Validate repository-wide constraints, reporting every error found.
    ///
    /// Per-project manifest checks (name match, local ranges, cycles) need
    /// the loaded manifests and live in the workspace loader; this covers
    /// everything decidable from the repository manifest alone.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.installer_tool_name.is_empty() {
            errors.push("Field 'installerToolName' cannot be empty".to_string());
        }
        if self.installer_tool_version.is_empty() {
            errors.push("Field 'installerToolVersion' cannot be empty".to_string());
        }
        if self.lockfile_path.is_empty() {
            errors.push("Field 'lockfilePath' cannot be empty".to_string());
        }
        if self.project_folder_min_depth > self.project_folder_max_depth {
            errors.push(format!(
                "projectFolderMinDepth ({}) exceeds projectFolderMaxDepth ({})",
                self.project_folder_min_depth, self.project_folder_max_depth
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for project in &self.projects {
            if !seen.insert(project.package_name.as_str()) {
                errors.push(format!(
                    "Project name '{}' is declared more than once",
                    project.package_name
                ));
            }

            let depth = folder_depth(&project.project_folder);
            if depth < self.project_folder_min_depth || depth > self.project_folder_max_depth {
                errors.push(format!(
                    "Project folder '{}' has depth {}, allowed range is {}..={}",
                    project.project_folder,
                    depth,
                    self.project_folder_min_depth,
                    self.project_folder_max_depth
                ));
            }

            if self.approved_packages_policy.enabled {
                match &project.review_category {
                    None => errors.push(format!(
                        "Project '{}' is missing reviewCategory (approval policy is enabled)",
                        project.package_name
                    )),
                    Some(category)
                        if !self
                            .approved_packages_policy
                            .review_categories
                            .contains(category) =>
                    {
                        errors.push(format!(
                            "Project '{}' has review category '{}', expected one of {:?}",
                            project.package_name,
                            category,
                            self.approved_packages_policy.review_categories
                        ));
                    }
                    _ => {}
                }
            }
        }

        for pattern in &self.allowed_email_patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(format!("Invalid email pattern '{pattern}': {e}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl ProjectConfig {
    /// Publishing is implied whenever a version policy is referenced
    pub fn is_published(&self) -> bool {
        self.should_publish || self.version_policy_name.is_some()
    }
}

/// Number of path components in a relative folder
pub fn folder_depth(folder: &str) -> usize {
    folder
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .count()
}
