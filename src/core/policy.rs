//! Version policies
//!
//! Two kinds of release policy govern project versions: lock-step (all
//! member projects share one version, bumped together) and individual
//! (members bump independently, optionally pinned to a major). Policies
//! live in a flat JSON list and are dispatched per call through the
//! [`VersionPolicy`] sum type.

use std::path::Path;

use semver::{Prerelease, Version};
use serde::{Deserialize, Serialize};

use crate::config::defaults::VERSION_POLICY_PATH;
use crate::core::package_json::PackageManifest;
use crate::core::ranges;
use crate::error::PolicyError;

/// How a bump moves a version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum BumpType {
    #[default]
    None,
    Prerelease,
    Patch,
    Preminor,
    Minor,
    Major,
}

/// Apply a semver increment
pub fn increment(
    version: &Version,
    bump: BumpType,
    preid: Option<&str>,
) -> Result<Version, PolicyError> {
    let mut next = version.clone();
    next.build = semver::BuildMetadata::EMPTY;
    match bump {
        BumpType::None => {}
        BumpType::Major => {
            next = Version::new(version.major + 1, 0, 0);
        }
        BumpType::Minor => {
            next = Version::new(version.major, version.minor + 1, 0);
        }
        BumpType::Patch => {
            next = Version::new(version.major, version.minor, version.patch + 1);
        }
        BumpType::Preminor => {
            next = Version::new(version.major, version.minor + 1, 0);
            next.pre = parse_preid(preid.unwrap_or("pre"), 0)?;
        }
        BumpType::Prerelease => {
            if version.pre.is_empty() {
                next = Version::new(version.major, version.minor, version.patch + 1);
                next.pre = parse_preid(preid.unwrap_or("pre"), 0)?;
            } else {
                // Advance the trailing counter of the existing prerelease
                let pre = version.pre.as_str();
                let (stem, counter) = match pre.rsplit_once('.') {
                    Some((stem, n)) if n.chars().all(|c| c.is_ascii_digit()) => {
                        (stem.to_string(), n.parse::<u64>().unwrap_or(0) + 1)
                    }
                    _ => (pre.to_string(), 1),
                };
                next.pre = parse_preid(&stem, counter)?;
            }
        }
    }
    Ok(next)
}

fn parse_preid(stem: &str, counter: u64) -> Result<Prerelease, PolicyError> {
    Prerelease::new(&format!("{stem}.{counter}")).map_err(|e| PolicyError::InvalidVersion {
        version: format!("{stem}.{counter}"),
        reason: e.to_string(),
    })
}

/// Lock-step policy: every member shares `version`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LockStepPolicy {
    pub policy_name: String,
    pub version: String,
    #[serde(default)]
    pub next_bump: BumpType,
}

/// Individual policy: members differ, optionally pinned to a major
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndividualPolicy {
    pub policy_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_major: Option<u64>,
}

/// A release policy, dispatched per call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "definitionName", rename_all = "camelCase")]
pub enum VersionPolicy {
    #[serde(rename = "lockStepVersion")]
    LockStep(LockStepPolicy),
    #[serde(rename = "individualVersion")]
    Individual(IndividualPolicy),
}

impl VersionPolicy {
    /// The policy's registry name
    pub fn name(&self) -> &str {
        match self {
            Self::LockStep(p) => &p.policy_name,
            Self::Individual(p) => &p.policy_name,
        }
    }

    /// Bring a member manifest in line with the policy.
    ///
    /// Returns the corrected manifest when a rewrite is needed, `None`
    /// when the manifest already conforms. A member running ahead of the
    /// policy is a fatal error.
    pub fn ensure(&self, manifest: &PackageManifest) -> Result<Option<PackageManifest>, PolicyError> {
        let version = ranges::parse_version(&manifest.version)?;
        match self {
            Self::LockStep(p) => {
                let target = ranges::parse_version(&p.version)?;
                match version.cmp(&target) {
                    std::cmp::Ordering::Equal => Ok(None),
                    std::cmp::Ordering::Less => {
                        let mut updated = manifest.clone();
                        updated.version = p.version.clone();
                        Ok(Some(updated))
                    }
                    std::cmp::Ordering::Greater => Err(PolicyError::AheadOfLockStep {
                        package: manifest.name.clone(),
                        version: manifest.version.clone(),
                        policy: p.policy_name.clone(),
                        policy_version: p.version.clone(),
                    }),
                }
            }
            Self::Individual(p) => {
                let Some(locked_major) = p.locked_major else {
                    return Ok(None);
                };
                match version.major.cmp(&locked_major) {
                    std::cmp::Ordering::Equal => Ok(None),
                    std::cmp::Ordering::Less => {
                        let mut updated = manifest.clone();
                        updated.version = format!("{locked_major}.0.0");
                        Ok(Some(updated))
                    }
                    std::cmp::Ordering::Greater => Err(PolicyError::AboveLockedMajor {
                        package: manifest.name.clone(),
                        version: manifest.version.clone(),
                        policy: p.policy_name.clone(),
                        locked_major,
                    }),
                }
            }
        }
    }

    /// Advance the policy itself.
    ///
    /// Lock-step policies move their stored version by `bump` (or their
    /// configured `nextBump` when `bump` is `None`); individual policies
    /// are driven by change files, so this is a no-op for them.
    pub fn bump(&mut self, bump: Option<BumpType>, preid: Option<&str>) -> Result<(), PolicyError> {
        match self {
            Self::LockStep(p) => {
                let effective = bump.unwrap_or(p.next_bump);
                let current = ranges::parse_version(&p.version)?;
                let next = increment(&current, effective, preid)?;
                p.version = next.to_string();
                Ok(())
            }
            Self::Individual(_) => Ok(()),
        }
    }

    /// Reject a proposed version that violates the policy
    pub fn validate(&self, version: &str, package_name: &str) -> Result<(), PolicyError> {
        let parsed = ranges::parse_version(version)?;
        match self {
            Self::LockStep(p) => {
                let target = ranges::parse_version(&p.version)?;
                if parsed != target {
                    return Err(PolicyError::LockStepMismatch {
                        package: package_name.to_string(),
                        version: version.to_string(),
                        policy: p.policy_name.clone(),
                        expected: p.version.clone(),
                    });
                }
                Ok(())
            }
            Self::Individual(p) => {
                if let Some(locked_major) = p.locked_major {
                    if parsed.major != locked_major {
                        return Err(PolicyError::AboveLockedMajor {
                            package: package_name.to_string(),
                            version: version.to_string(),
                            policy: p.policy_name.clone(),
                            locked_major,
                        });
                    }
                }
                Ok(())
            }
        }
    }
}

/// The loaded policy registry
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    policies: Vec<VersionPolicy>,
}

impl PolicySet {
    /// An empty registry
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the registry for a repository, tolerating a missing file
    pub fn load_for(repo_root: &Path) -> Result<Self, PolicyError> {
        let path = repo_root.join(VERSION_POLICY_PATH);
        if !path.exists() {
            return Ok(Self::empty());
        }
        Self::load(&path)
    }

    /// Load the registry from an explicit path
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let content = std::fs::read_to_string(path).map_err(|e| PolicyError::Load {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let policies: Vec<VersionPolicy> =
            serde_json::from_str(&content).map_err(|e| PolicyError::Load {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;
        Ok(Self { policies })
    }

    /// Persist the registry (the version flow rewrites bumped policies)
    pub fn save(&self, path: &Path) -> Result<(), PolicyError> {
        let mut content = serde_json::to_string_pretty(&self.policies).map_err(|e| {
            PolicyError::Load {
                path: path.to_path_buf(),
                error: e.to_string(),
            }
        })?;
        content.push('\n');
        std::fs::write(path, content).map_err(|e| PolicyError::Load {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Look up a policy by name
    pub fn get(&self, name: &str) -> Option<&VersionPolicy> {
        self.policies.iter().find(|p| p.name() == name)
    }

    /// Mutable lookup for bumps
    pub fn get_mut(&mut self, name: &str) -> Option<&mut VersionPolicy> {
        self.policies.iter_mut().find(|p| p.name() == name)
    }

    /// Iterate all policies
    pub fn iter(&self) -> impl Iterator<Item = &VersionPolicy> {
        self.policies.iter()
    }

    /// Mutable iteration for bulk bumps
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut VersionPolicy> {
        self.policies.iter_mut()
    }
}
