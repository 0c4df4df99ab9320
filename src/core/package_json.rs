//! Package manifest (package.json) parsing and rewriting
//!
//! Each project declares its name, version, dependency ranges, and named
//! scripts in the standard package manifest format. The version flow
//! rewrites these files in place, so serialization preserves field order.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::error::WorkspaceError;

/// A project's declared package manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageManifest {
    /// Package name, possibly scoped (`@scope/name`)
    pub name: String,

    /// Package version (semver)
    pub version: String,

    /// Runtime dependencies: name -> range
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,

    /// Development dependencies: name -> range
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", rename = "devDependencies")]
    pub dev_dependencies: BTreeMap<String, String>,

    /// Optional dependencies: name -> range
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        rename = "optionalDependencies"
    )]
    pub optional_dependencies: BTreeMap<String, String>,

    /// Named command strings
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, String>,

    /// Marks the package as not publishable to a registry
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub private: bool,

    /// Fields we do not interpret but must round-trip when rewriting
    #[serde(flatten)]
    pub extra: Map<String, serde_json::Value>,
}

impl PackageManifest {
    /// Load a package manifest from a file path
    pub fn load(path: &Path) -> Result<Self, WorkspaceError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| WorkspaceError::ProjectManifest {
                project: path.display().to_string(),
                error: e.to_string(),
            })?;
        Self::from_json(&content).map_err(|e| WorkspaceError::ProjectManifest {
            project: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Parse from a JSON string
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Serialize to pretty-printed JSON with a trailing newline
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }

    /// Write the manifest back to disk
    pub fn save(&self, path: &Path) -> Result<(), WorkspaceError> {
        let content = self.to_json().map_err(|e| WorkspaceError::ProjectManifest {
            project: self.name.clone(),
            error: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| WorkspaceError::ProjectManifest {
            project: self.name.clone(),
            error: e.to_string(),
        })
    }

    /// The `name` portion of a scoped package name (`@scope/foo` -> `foo`)
    pub fn unscoped_name(&self) -> &str {
        unscope(&self.name)
    }

    /// Look up a declared script by name
    pub fn script(&self, name: &str) -> Option<&str> {
        self.scripts.get(name).map(String::as_str)
    }

    /// Iterate dependencies and devDependencies as (name, range) pairs.
    ///
    /// Regular dependencies are yielded first; the install planner relies
    /// on that ordering when a name appears in both maps.
    pub fn deps_and_dev_deps(&self) -> impl Iterator<Item = (&str, &str)> {
        self.dependencies
            .iter()
            .chain(self.dev_dependencies.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Strip the scope from a package name, if any
pub fn unscope(name: &str) -> &str {
    match name.strip_prefix('@') {
        Some(rest) => rest.split_once('/').map_or(name, |(_, n)| n),
        None => name,
    }
}
