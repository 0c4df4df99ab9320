//! Install planning
//!
//! From N project manifests the planner synthesizes one common manifest
//! plus a stub package per project, so the external installer resolves a
//! single dependency tree for the whole repository. Along the way it
//! decides which dependencies are satisfied by local links instead of
//! the registry, and judges whether the committed lockfile still covers
//! everything.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

use crate::config::defaults::{
    COMMON_MANIFEST_PATH, COMMON_PACKAGE_NAME, STUB_PROJECTS_FOLDER,
};
use crate::core::ranges;
use crate::core::shrinkwrap::Shrinkwrap;
use crate::core::workspace::Workspace;
use crate::error::PlanError;

/// The minimal manifest packaged into a stub archive
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StubManifest {
    pub name: String,
    pub version: String,
    pub private: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(
        skip_serializing_if = "BTreeMap::is_empty",
        rename = "optionalDependencies"
    )]
    pub optional_dependencies: BTreeMap<String, String>,
}

/// One project's stub package
#[derive(Debug, Clone)]
pub struct StubPackage {
    /// Workspace project this stub stands in for
    pub project_name: String,
    /// Name under the reserved temp scope
    pub temp_name: String,
    /// Archive file name under the stub projects folder
    pub archive_filename: String,
    /// The stub manifest
    pub manifest: StubManifest,
}

/// The computed install plan
#[derive(Debug)]
pub struct InstallPlan {
    /// Pinned external dependencies: name -> range
    pub pinned: BTreeMap<String, String>,
    /// Per-project stubs, in workspace declaration order
    pub stubs: Vec<StubPackage>,
    /// Local link edges: consumer project -> locally-satisfied dep names
    pub local_links: BTreeMap<String, BTreeSet<String>>,
    /// The synthesized common manifest, serialized
    pub common_manifest_json: String,
}

/// Result of writing the plan to disk
#[derive(Debug, Default)]
pub struct WriteSummary {
    /// Stub archives whose bytes changed
    pub stubs_rewritten: usize,
    /// Whether the common manifest changed
    pub manifest_rewritten: bool,
    /// Orphaned stub archives removed
    pub orphans_removed: usize,
}

/// Verdict on the committed lockfile
#[derive(Debug, PartialEq, Eq)]
pub enum LockfileVerdict {
    /// Every pin and stub pair has a compatible entry
    Valid,
    /// The installer must re-resolve; reasons listed
    Invalid(Vec<String>),
}

impl LockfileVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl InstallPlan {
    /// Compute the plan for a workspace
    pub fn compute(workspace: &Workspace) -> Result<Self, PlanError> {
        let pinned = compute_pins(workspace)?;

        let mut stubs = Vec::with_capacity(workspace.projects.len());
        let mut local_links: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for project in &workspace.projects {
            let mut dependencies: BTreeMap<String, String> = BTreeMap::new();
            let mut links = BTreeSet::new();

            // devDependencies are promoted into the stub's dependencies;
            // a name declared in both maps keeps the regular range.
            for (name, range) in project.manifest.deps_and_dev_deps() {
                if dependencies.contains_key(name) {
                    continue;
                }
                if is_local_link(workspace, &project.name, name, range) {
                    links.insert(name.to_string());
                    continue;
                }
                dependencies.insert(name.to_string(), range.to_string());
            }

            let manifest = StubManifest {
                name: project.temp_name.clone(),
                version: "0.0.0".to_string(),
                private: true,
                dependencies,
                optional_dependencies: project.manifest.optional_dependencies.clone(),
            };

            stubs.push(StubPackage {
                project_name: project.name.clone(),
                temp_name: project.temp_name.clone(),
                archive_filename: format!("{}.tgz", project.unscoped_temp_name()),
                manifest,
            });
            local_links.insert(project.name.clone(), links);
        }

        let common_manifest_json = synthesize_common_manifest(&pinned, &stubs);

        Ok(Self {
            pinned,
            stubs,
            local_links,
            common_manifest_json,
        })
    }

    /// Write the stub archives and common manifest under the repo root.
    ///
    /// A stub archive is rewritten only when its bytes differ from what
    /// is already on disk; the installer driver's mtime comparison
    /// depends on unchanged stubs keeping their timestamps.
    pub fn write(&self, repo_root: &Path) -> Result<WriteSummary, PlanError> {
        let mut summary = WriteSummary::default();
        let projects_folder = repo_root.join(STUB_PROJECTS_FOLDER);
        std::fs::create_dir_all(&projects_folder).map_err(|e| PlanError::StubArchive {
            path: projects_folder.clone(),
            error: e.to_string(),
        })?;

        let mut expected: BTreeSet<String> = BTreeSet::new();
        for stub in &self.stubs {
            expected.insert(stub.archive_filename.clone());
            let path = projects_folder.join(&stub.archive_filename);
            let fresh = stub.archive_bytes().map_err(|e| PlanError::StubArchive {
                path: path.clone(),
                error: e.to_string(),
            })?;
            if std::fs::read(&path).map(|old| old == fresh).unwrap_or(false) {
                continue;
            }
            std::fs::write(&path, &fresh).map_err(|e| PlanError::StubArchive {
                path: path.clone(),
                error: e.to_string(),
            })?;
            summary.stubs_rewritten += 1;
        }

        summary.orphans_removed = remove_orphan_stubs(&projects_folder, &expected);

        let manifest_path = repo_root.join(COMMON_MANIFEST_PATH);
        let current = std::fs::read_to_string(&manifest_path).unwrap_or_default();
        if current != self.common_manifest_json {
            std::fs::write(&manifest_path, &self.common_manifest_json).map_err(|e| {
                PlanError::CommonManifest {
                    path: manifest_path.clone(),
                    error: e.to_string(),
                }
            })?;
            summary.manifest_rewritten = true;
        }

        Ok(summary)
    }

    /// Judge whether the lockfile covers this plan
    pub fn validate_lockfile(
        &self,
        workspace: &Workspace,
        shrinkwrap: &mut Shrinkwrap,
    ) -> LockfileVerdict {
        let mut reasons = Vec::new();

        for (name, range) in &self.pinned {
            if !shrinkwrap.has_compatible(name, range, None) {
                reasons.push(format!("Pinned dependency '{name}@{range}' is not satisfied"));
            }
        }

        for stub in &self.stubs {
            for (name, range) in &stub.manifest.dependencies {
                if !shrinkwrap.has_compatible(name, range, Some(&stub.temp_name)) {
                    reasons.push(format!(
                        "'{name}@{range}' required by '{}' is not satisfied",
                        stub.project_name
                    ));
                }
            }
        }

        for temp_name in shrinkwrap.temp_project_names() {
            if workspace.project_by_temp_name(&temp_name).is_none() {
                reasons.push(format!(
                    "Lockfile temp project '{temp_name}' has no workspace project (orphan)"
                ));
            }
        }

        if reasons.is_empty() {
            LockfileVerdict::Valid
        } else {
            LockfileVerdict::Invalid(reasons)
        }
    }

    /// The on-disk path of a stub archive
    pub fn stub_archive_path(&self, repo_root: &Path, stub: &StubPackage) -> PathBuf {
        repo_root.join(STUB_PROJECTS_FOLDER).join(&stub.archive_filename)
    }
}

impl StubPackage {
    /// Serialize the stub manifest
    pub fn manifest_json(&self) -> String {
        let mut json =
            serde_json::to_string_pretty(&self.manifest).expect("stub manifest serializes");
        json.push('\n');
        json
    }

    /// Deterministic gzipped archive holding `package/package.json`.
    ///
    /// All archive metadata is zeroed so identical manifests produce
    /// byte-identical archives.
    pub fn archive_bytes(&self) -> std::io::Result<Vec<u8>> {
        let manifest = self.manifest_json();

        let mut tarball = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tarball);
            let mut header = tar::Header::new_gnu();
            header.set_size(manifest.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(0);
            header.set_uid(0);
            header.set_gid(0);
            header.set_cksum();
            builder.append_data(&mut header, "package/package.json", manifest.as_bytes())?;
            builder.finish()?;
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tarball)?;
        encoder.finish()
    }
}

/// Is (name, range) declared by `consumer` satisfied by a local link?
fn is_local_link(workspace: &Workspace, consumer: &str, name: &str, range: &str) -> bool {
    let Some(local) = workspace.project_by_name(name) else {
        return false;
    };
    let Some(consumer_project) = workspace.project_by_name(consumer) else {
        return false;
    };
    if consumer_project.cyclic_exemptions.contains(name) {
        return false;
    }
    if !ranges::is_semver_specifier(range) {
        return false;
    }
    match local.version() {
        Ok(version) => ranges::satisfies(&version, range).unwrap_or(false),
        Err(_) => false,
    }
}

/// Merge implicit pins (single distinct range across the workspace) with
/// operator-declared explicit pins; explicit wins.
fn compute_pins(workspace: &Workspace) -> Result<BTreeMap<String, String>, PlanError> {
    let mut ranges_by_name: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for project in &workspace.projects {
        for (name, range) in project.manifest.deps_and_dev_deps() {
            if workspace.project_by_name(name).is_some() {
                continue;
            }
            ranges_by_name.entry(name).or_default().insert(range);
        }
    }

    let mut pinned: BTreeMap<String, String> = ranges_by_name
        .into_iter()
        .filter_map(|(name, ranges)| {
            if ranges.len() == 1 {
                let range = ranges.into_iter().next().expect("len checked");
                Some((name.to_string(), range.to_string()))
            } else {
                None
            }
        })
        .collect();

    for (name, range) in &workspace.config.pinned_versions {
        if range.trim().is_empty() {
            return Err(PlanError::BadPin {
                name: name.clone(),
                reason: "empty specifier".to_string(),
            });
        }
        pinned.insert(name.clone(), range.clone());
    }

    Ok(pinned)
}

fn synthesize_common_manifest(
    pinned: &BTreeMap<String, String>,
    stubs: &[StubPackage],
) -> String {
    #[derive(Serialize)]
    struct CommonManifest<'a> {
        name: &'a str,
        version: &'a str,
        private: bool,
        dependencies: BTreeMap<&'a str, String>,
    }

    let mut dependencies: BTreeMap<&str, String> = pinned
        .iter()
        .map(|(name, range)| (name.as_str(), range.clone()))
        .collect();
    for stub in stubs {
        dependencies.insert(
            stub.temp_name.as_str(),
            format!("file:./projects/{}", stub.archive_filename),
        );
    }

    let manifest = CommonManifest {
        name: COMMON_PACKAGE_NAME,
        version: "0.0.0",
        private: true,
        dependencies,
    };
    let mut json = serde_json::to_string_pretty(&manifest).expect("common manifest serializes");
    json.push('\n');
    json
}

fn remove_orphan_stubs(projects_folder: &Path, expected: &BTreeSet<String>) -> usize {
    let Ok(entries) = std::fs::read_dir(projects_folder) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(".tgz") && !expected.contains(&name) {
            if std::fs::remove_file(entry.path()).is_ok() {
                tracing::info!("Removed orphaned stub archive '{name}'");
                removed += 1;
            }
        }
    }
    removed
}
