//! Change-request pipeline
//!
//! Change files authored at commit time drive the version flow: they are
//! aggregated per package (the largest requested kind wins), bumps are
//! propagated downstream through the dependency graph, and the resulting
//! manifest and changelog rewrites are applied in dependency order.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::core::changelog;
use crate::core::policy::{increment, BumpType};
use crate::core::ranges;
use crate::core::workspace::Workspace;
use crate::error::ChangeError;

/// Kind of change; aggregation takes the maximum
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    #[default]
    None,
    Dependency,
    Patch,
    Minor,
    Major,
}

impl ChangeKind {
    /// The semver increment a kind maps to
    fn bump_type(self) -> BumpType {
        match self {
            Self::Major => BumpType::Major,
            Self::Minor => BumpType::Minor,
            Self::Patch => BumpType::Patch,
            Self::Dependency | Self::None => BumpType::None,
        }
    }

    /// Section label used in changelogs
    pub fn label(self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
            Self::Dependency => "dependency",
            Self::None => "none",
        }
    }
}

/// One change record inside a change file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeInfo {
    pub package_name: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

/// A change file envelope (`changes/<branch...>/<name>.json`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeFile {
    pub package_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub changes: Vec<ChangeInfo>,
}

/// Aggregated state for one package during a pipeline run
#[derive(Debug, Clone)]
pub struct AggregatedChange {
    pub package_name: String,
    pub kind: ChangeKind,
    /// Comments grouped by the kind they arrived under
    pub comments: BTreeMap<ChangeKind, Vec<String>>,
    pub current_version: Version,
    pub new_version: Version,
    /// Application order; dependencies apply before dependents
    pub order: usize,
}

impl AggregatedChange {
    pub fn version_changed(&self) -> bool {
        self.new_version != self.current_version
    }
}

/// Pipeline inputs beyond the change files themselves
#[derive(Debug, Default)]
pub struct PipelineOptions {
    /// Suffix mode: versions get `-<token>` instead of a semver bump and
    /// changelog entries are elided
    pub prerelease_token: Option<String>,
    /// Packages whose versions must not move
    pub exclude: HashSet<String>,
    /// Report what would happen without touching disk
    pub dry_run: bool,
}

/// Result of one pipeline run
#[derive(Debug)]
pub struct PipelineResult {
    /// Applied (or would-be applied) changes in application order
    pub applied: Vec<AggregatedChange>,
    /// Change files consumed (or that would be consumed)
    pub consumed_files: Vec<PathBuf>,
}

/// Read every change file under `folder`, recursively.
///
/// Each file is validated against the workspace; a change for an unknown
/// package is an error.
pub fn read_change_files(
    workspace: &Workspace,
    folder: &Path,
) -> Result<Vec<(PathBuf, ChangeFile)>, ChangeError> {
    let mut out = Vec::new();
    if !folder.exists() {
        return Ok(out);
    }
    for entry in walkdir::WalkDir::new(folder).sort_by_file_name() {
        let entry = entry.map_err(|e| ChangeError::Io {
            path: folder.to_path_buf(),
            error: e.to_string(),
        })?;
        if !entry.file_type().is_file()
            || entry.path().extension().and_then(|e| e.to_str()) != Some("json")
        {
            continue;
        }
        let content = std::fs::read_to_string(entry.path()).map_err(|e| ChangeError::Io {
            path: entry.path().to_path_buf(),
            error: e.to_string(),
        })?;
        let file: ChangeFile =
            serde_json::from_str(&content).map_err(|e| ChangeError::Parse {
                path: entry.path().to_path_buf(),
                error: e.to_string(),
            })?;
        for change in &file.changes {
            if workspace.project_by_name(&change.package_name).is_none() {
                return Err(ChangeError::UnknownPackage {
                    path: entry.path().to_path_buf(),
                    package: change.package_name.clone(),
                });
            }
        }
        out.push((entry.path().to_path_buf(), file));
    }
    Ok(out)
}

/// Run the full pipeline: aggregate, propagate, stamp, apply.
pub fn execute(
    workspace: &mut Workspace,
    changes_folder: &Path,
    options: &PipelineOptions,
) -> Result<PipelineResult, ChangeError> {
    let files = read_change_files(workspace, changes_folder)?;
    let incoming = files
        .iter()
        .flat_map(|(_, file)| file.changes.iter().cloned());

    let mut aggregated = aggregate(workspace, incoming, options)?;
    propagate(workspace, &mut aggregated, options)?;

    let mut applied: Vec<AggregatedChange> = aggregated
        .into_values()
        .filter(|c| c.kind != ChangeKind::None || c.version_changed())
        .collect();
    applied.sort_by(|a, b| a.order.cmp(&b.order).then(a.package_name.cmp(&b.package_name)));

    if !options.dry_run {
        apply(workspace, &applied, options)?;
    }

    let consumed_files: Vec<PathBuf> = files.into_iter().map(|(path, _)| path).collect();
    if !options.dry_run {
        for path in &consumed_files {
            std::fs::remove_file(path).map_err(|e| ChangeError::Io {
                path: path.clone(),
                error: e.to_string(),
            })?;
        }
        remove_empty_folders(changes_folder);
    }

    Ok(PipelineResult {
        applied,
        consumed_files,
    })
}

/// Aggregate incoming changes per package
fn aggregate(
    workspace: &Workspace,
    incoming: impl Iterator<Item = ChangeInfo>,
    options: &PipelineOptions,
) -> Result<BTreeMap<String, AggregatedChange>, ChangeError> {
    let mut aggregated: BTreeMap<String, AggregatedChange> = BTreeMap::new();

    for info in incoming {
        let project = workspace
            .project_by_name(&info.package_name)
            .expect("change files were validated against the workspace");
        let current_version =
            parse_project_version(&info.package_name, &project.manifest.version)?;

        let entry = aggregated
            .entry(info.package_name.clone())
            .or_insert_with(|| AggregatedChange {
                package_name: info.package_name.clone(),
                kind: ChangeKind::None,
                comments: BTreeMap::new(),
                current_version: current_version.clone(),
                new_version: current_version.clone(),
                order: 0,
            });
        entry.kind = entry.kind.max(info.kind);
        if let Some(comment) = info.comment.filter(|c| !c.is_empty()) {
            entry.comments.entry(info.kind).or_default().push(comment);
        }
    }

    for entry in aggregated.values_mut() {
        recompute_version(entry, workspace, options)?;
    }
    Ok(aggregated)
}

/// Downstream propagation: a bumped package registers changes for its
/// direct dependents, recursively, and stamps application order.
///
/// Dependents come from the manifests, not from the build graph: the
/// build graph prunes edges whose declared range no longer covers the
/// local version, and those are precisely the dependents that must take
/// a patch here. Patch-vs-dependency is decided against the bumped
/// package's new version.
fn propagate(
    workspace: &Workspace,
    aggregated: &mut BTreeMap<String, AggregatedChange>,
    options: &PipelineOptions,
) -> Result<(), ChangeError> {
    let mut worklist: Vec<String> = aggregated
        .iter()
        .filter(|(_, c)| c.version_changed())
        .map(|(name, _)| name.clone())
        .collect();

    while let Some(bumped_name) = worklist.pop() {
        let (bumped_version, bumped_order) = {
            let bumped = &aggregated[&bumped_name];
            (bumped.new_version.clone(), bumped.order)
        };

        for dependent_name in workspace.manifest_dependents_of(&bumped_name) {
            let dependent = workspace
                .project_by_name(&dependent_name)
                .expect("downstream names are workspace projects");
            let declared_range = dependent
                .manifest
                .dependencies
                .get(&bumped_name)
                .or_else(|| dependent.manifest.dev_dependencies.get(&bumped_name))
                .cloned();
            let Some(declared_range) = declared_range else {
                continue;
            };

            let registered_kind = if options.prerelease_token.is_some() {
                // Always-update: prerelease trains move together
                ChangeKind::Dependency
            } else if range_satisfied(&bumped_version, &declared_range) {
                ChangeKind::Dependency
            } else {
                ChangeKind::Patch
            };

            let current_version =
                parse_project_version(&dependent_name, &dependent.manifest.version)?;
            let entry = aggregated
                .entry(dependent_name.clone())
                .or_insert_with(|| AggregatedChange {
                    package_name: dependent_name.clone(),
                    kind: ChangeKind::None,
                    comments: BTreeMap::new(),
                    current_version: current_version.clone(),
                    new_version: current_version.clone(),
                    order: 0,
                });

            let before = (entry.kind, entry.new_version.clone(), entry.order);
            entry.kind = entry.kind.max(registered_kind);
            entry.order = entry.order.max(bumped_order + 1);
            recompute_version(entry, workspace, options)?;

            if (entry.kind, entry.new_version.clone(), entry.order) != before {
                worklist.push(dependent_name);
            }
        }
    }
    Ok(())
}

/// Recompute a package's target version from its aggregated kind
fn recompute_version(
    entry: &mut AggregatedChange,
    workspace: &Workspace,
    options: &PipelineOptions,
) -> Result<(), ChangeError> {
    let project = workspace
        .project_by_name(&entry.package_name)
        .expect("aggregated names are workspace projects");

    let skipped = options.exclude.contains(&entry.package_name) || !project.should_publish;
    if skipped {
        entry.kind = ChangeKind::None;
        entry.new_version = entry.current_version.clone();
        return Ok(());
    }

    if let Some(token) = &options.prerelease_token {
        if entry.kind != ChangeKind::None {
            let mut suffixed = entry.current_version.clone();
            suffixed.pre = semver::Prerelease::new(token).map_err(|e| ChangeError::Parse {
                path: PathBuf::from(&entry.package_name),
                error: format!("invalid prerelease token '{token}': {e}"),
            })?;
            entry.new_version = suffixed;
        }
        return Ok(());
    }

    if entry.kind >= ChangeKind::Patch {
        entry.new_version =
            increment(&entry.current_version, entry.kind.bump_type(), None).map_err(|e| {
                ChangeError::Parse {
                    path: PathBuf::from(&entry.package_name),
                    error: e.to_string(),
                }
            })?;
    } else {
        entry.new_version = entry.current_version.clone();
    }
    Ok(())
}

/// Rewrite manifests and changelogs in application order
fn apply(
    workspace: &mut Workspace,
    applied: &[AggregatedChange],
    options: &PipelineOptions,
) -> Result<(), ChangeError> {
    let by_name: BTreeMap<&str, &AggregatedChange> = applied
        .iter()
        .map(|c| (c.package_name.as_str(), c))
        .collect();
    let root = workspace.root.clone();

    for change in applied {
        let project = workspace
            .project_by_name_mut(&change.package_name)
            .expect("applied names are workspace projects");
        let project_folder = root.join(&project.folder);

        let mut manifest = project.manifest.clone();
        if change.version_changed() {
            manifest.version = change.new_version.to_string();
        }

        let mut dependency_notes = Vec::new();
        rewrite_ranges(&mut manifest.dependencies, &by_name, &mut dependency_notes);
        rewrite_ranges(&mut manifest.dev_dependencies, &by_name, &mut dependency_notes);

        let manifest_path = project_folder.join("package.json");
        manifest
            .save(&manifest_path)
            .map_err(|e| ChangeError::Io {
                path: manifest_path,
                error: e.to_string(),
            })?;
        project.manifest = manifest;

        // Changelog entries are elided for unchanged versions and for
        // prerelease trains
        if change.version_changed() && options.prerelease_token.is_none() {
            let mut comments = change.comments.clone();
            for note in dependency_notes {
                comments.entry(ChangeKind::Dependency).or_default().push(note);
            }
            changelog::append_entry(
                &project_folder,
                &change.package_name,
                &change.new_version.to_string(),
                &comments,
            )
            .map_err(|e| ChangeError::Changelog {
                package: change.package_name.clone(),
                error: e.to_string(),
            })?;
        }
    }
    Ok(())
}

/// Rewrite ranges pointing at bumped packages, preserving their shape
fn rewrite_ranges(
    ranges_map: &mut BTreeMap<String, String>,
    by_name: &BTreeMap<&str, &AggregatedChange>,
    notes: &mut Vec<String>,
) {
    for (dep, range) in ranges_map.iter_mut() {
        let Some(change) = by_name.get(dep.as_str()) else {
            continue;
        };
        if !change.version_changed() {
            continue;
        }
        if let Some(rewritten) = rewrite_range(range, &change.new_version) {
            if *range != rewritten {
                notes.push(format!(
                    "Updating dependency \"{dep}\" to `{}`",
                    change.new_version
                ));
                *range = rewritten;
            }
        }
    }
}

/// Preserve-prefix rules: `~` stays `~`, `^` stays `^`, a bare version
/// stays bare, a comparator range is reshaped to `>=new <next-major`.
/// Anything else (git, tag, URL) passes through untouched.
fn rewrite_range(old_range: &str, new_version: &Version) -> Option<String> {
    let trimmed = old_range.trim();
    if let Some(rest) = trimmed.strip_prefix('~') {
        if Version::parse(rest.trim()).is_ok() {
            return Some(format!("~{new_version}"));
        }
    }
    if let Some(rest) = trimmed.strip_prefix('^') {
        if Version::parse(rest.trim()).is_ok() {
            return Some(format!("^{new_version}"));
        }
    }
    if Version::parse(trimmed).is_ok() {
        return Some(new_version.to_string());
    }
    if trimmed.starts_with(">=") {
        return Some(ranges::bumped_range(new_version));
    }
    None
}

fn range_satisfied(version: &Version, range: &str) -> bool {
    if !ranges::is_semver_specifier(range) {
        return true;
    }
    ranges::satisfies(version, range).unwrap_or(false)
}

fn parse_project_version(name: &str, version: &str) -> Result<Version, ChangeError> {
    ranges::parse_version(version).map_err(|e| ChangeError::Parse {
        path: PathBuf::from(name),
        error: e.to_string(),
    })
}

/// Best-effort cleanup of branch folders emptied by consumption
fn remove_empty_folders(folder: &Path) {
    let Ok(entries) = std::fs::read_dir(folder) else {
        return;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            remove_empty_folders(&entry.path());
            let _ = std::fs::remove_dir(entry.path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_change_file_parses() {
        let json = r#"{
            "packageName": "@acme/core",
            "email": "dev@example.com",
            "changes": [
                { "packageName": "@acme/core", "type": "minor",
                  "comment": "Add widgets", "author": "dev" }
            ]
        }"#;
        let file: ChangeFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.changes.len(), 1);
        assert_eq!(file.changes[0].kind, ChangeKind::Minor);
    }

    #[test]
    fn test_kind_ordering() {
        assert!(ChangeKind::None < ChangeKind::Dependency);
        assert!(ChangeKind::Dependency < ChangeKind::Patch);
        assert!(ChangeKind::Patch < ChangeKind::Minor);
        assert!(ChangeKind::Minor < ChangeKind::Major);
    }

    #[test]
    fn test_rewrite_range_preserves_prefix() {
        let v = Version::new(1, 1, 0);
        assert_eq!(rewrite_range("^1.0.0", &v).unwrap(), "^1.1.0");
        assert_eq!(rewrite_range("~1.0.0", &v).unwrap(), "~1.1.0");
        assert_eq!(rewrite_range("1.0.0", &v).unwrap(), "1.1.0");
        assert_eq!(
            rewrite_range(">=1.0.0 <2.0.0", &v).unwrap(),
            ">=1.1.0 <2.0.0"
        );
        assert!(rewrite_range("git+https://example.com/r.git", &v).is_none());
    }

    proptest! {
        /// Aggregation by maximum is commutative and idempotent: any
        /// ordering of any subset with repeats lands on the same kind.
        #[test]
        fn prop_kind_aggregation_order_independent(
            kinds in proptest::collection::vec(
                prop_oneof![
                    Just(ChangeKind::None),
                    Just(ChangeKind::Dependency),
                    Just(ChangeKind::Patch),
                    Just(ChangeKind::Minor),
                    Just(ChangeKind::Major),
                ],
                1..8,
            ),
            seed in 0usize..100,
        ) {
            let forward = kinds.iter().fold(ChangeKind::None, |acc, &k| acc.max(k));
            let mut shuffled = kinds.clone();
            shuffled.rotate_left(seed % kinds.len());
            let rotated = shuffled.iter().fold(ChangeKind::None, |acc, &k| acc.max(k));
            let doubled = kinds
                .iter()
                .chain(kinds.iter())
                .fold(ChangeKind::None, |acc, &k| acc.max(k));
            prop_assert_eq!(forward, rotated);
            prop_assert_eq!(forward, doubled);
        }
    }
}
