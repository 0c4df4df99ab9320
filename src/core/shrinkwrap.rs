//! Lockfile query adapter
//!
//! The committed lockfile is a foreign document owned by the external
//! installer. Monorail never writes it and never walks its full shape;
//! the only questions asked of it are "is there an entry compatible with
//! this name and range?" (optionally scoped under a temp project) and
//! "which temp projects does it know about?".

use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;

use crate::config::defaults::TEMP_SCOPE;
use crate::core::ranges;
use crate::error::LockfileError;

/// An opened lockfile document
#[derive(Debug)]
pub struct Shrinkwrap {
    document: Value,
    /// Specifiers already warned about, to keep pass-through noise down
    warned_specifiers: HashSet<String>,
}

impl Shrinkwrap {
    /// Open and parse a lockfile. Tolerates a UTF-8 BOM.
    pub fn open(path: &Path) -> Result<Self, LockfileError> {
        if !path.exists() {
            return Err(LockfileError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|e| LockfileError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::parse(raw.trim_start_matches('\u{feff}')).map_err(|e| LockfileError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse from a JSON string
    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            document: serde_json::from_str(content)?,
            warned_specifiers: HashSet::new(),
        })
    }

    /// Does the lockfile hold a version of `name` satisfying `range`?
    ///
    /// When `temp_scope` is given, the entry nested under that temp
    /// project is preferred; the top-level entry is the fallback. Ranges
    /// that are not semver (git, tarball, tag) are assumed compatible,
    /// with a one-time warning per specifier.
    pub fn has_compatible(&mut self, name: &str, range: &str, temp_scope: Option<&str>) -> bool {
        if !ranges::is_semver_specifier(range) {
            if self.warned_specifiers.insert(range.to_string()) {
                tracing::warn!(
                    "Cannot verify '{name}@{range}' against the lockfile; assuming compatible"
                );
            }
            return true;
        }

        let version = temp_scope
            .and_then(|scope| self.entry_version(&[scope, name]))
            .or_else(|| self.entry_version(&[name]));

        match version {
            Some(version) => match ranges::parse_version(&version) {
                Ok(parsed) => ranges::satisfies(&parsed, range).unwrap_or(false),
                Err(_) => false,
            },
            None => false,
        }
    }

    /// `.version` of the entry reached by descending `dependencies` maps
    fn entry_version(&self, path: &[&str]) -> Option<String> {
        let mut node = &self.document;
        for name in path {
            node = node.get("dependencies")?.get(name)?;
        }
        node.get("version")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Names of the reserved-scope temp projects the lockfile knows about
    pub fn temp_project_names(&self) -> Vec<String> {
        let Some(deps) = self.document.get("dependencies").and_then(Value::as_object) else {
            return Vec::new();
        };
        deps.keys()
            .filter(|name| name.starts_with(&format!("{TEMP_SCOPE}/")))
            .cloned()
            .collect()
    }
}
