//! Changelog generation
//!
//! Each published project carries a machine-readable `CHANGELOG.json`
//! (newest entry first) and a `CHANGELOG.md` regenerated from it. The
//! change pipeline appends one entry per package per released version.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::core::changes::ChangeKind;
use crate::error::ChangeError;

const CHANGELOG_JSON: &str = "CHANGELOG.json";
const CHANGELOG_MD: &str = "CHANGELOG.md";

/// One comment inside a changelog entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangelogComment {
    pub comment: String,
}

/// One released version
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangelogEntry {
    pub version: String,
    pub date: String,
    /// Kind label -> comments
    pub comments: BTreeMap<String, Vec<ChangelogComment>>,
}

/// The whole changelog document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Changelog {
    pub name: String,
    pub entries: Vec<ChangelogEntry>,
}

impl Changelog {
    fn load_or_new(folder: &Path, package_name: &str) -> Self {
        let path = folder.join(CHANGELOG_JSON);
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_else(|| Self {
                name: package_name.to_string(),
                entries: Vec::new(),
            })
    }

    fn save(&self, folder: &Path) -> Result<(), std::io::Error> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        std::fs::write(folder.join(CHANGELOG_JSON), json)?;
        std::fs::write(folder.join(CHANGELOG_MD), self.render_markdown())?;
        Ok(())
    }

    /// Regenerate the human-readable changelog
    fn render_markdown(&self) -> String {
        let mut out = format!("# Change Log - {}\n", self.name);
        for entry in &self.entries {
            out.push_str(&format!("\n## {} ({})\n", entry.version, entry.date));
            for (label, comments) in &entry.comments {
                if comments.is_empty() {
                    continue;
                }
                let heading = match label.as_str() {
                    "major" => "Breaking changes",
                    "minor" => "Minor changes",
                    "patch" => "Patches",
                    "dependency" => "Updates",
                    other => other,
                };
                out.push_str(&format!("\n### {heading}\n\n"));
                for comment in comments {
                    out.push_str(&format!("- {}\n", comment.comment));
                }
            }
        }
        out
    }
}

/// Append an entry for a freshly-released version.
///
/// An entry whose version already heads the changelog is not duplicated;
/// re-running the version flow is idempotent.
pub fn append_entry(
    folder: &Path,
    package_name: &str,
    version: &str,
    comments: &BTreeMap<ChangeKind, Vec<String>>,
) -> Result<(), ChangeError> {
    let mut changelog = Changelog::load_or_new(folder, package_name);
    if changelog
        .entries
        .first()
        .map(|e| e.version == version)
        .unwrap_or(false)
    {
        return Ok(());
    }

    let mut grouped: BTreeMap<String, Vec<ChangelogComment>> = BTreeMap::new();
    for (kind, texts) in comments {
        if *kind == ChangeKind::None || texts.is_empty() {
            continue;
        }
        grouped.insert(
            kind.label().to_string(),
            texts
                .iter()
                .map(|comment| ChangelogComment {
                    comment: comment.clone(),
                })
                .collect(),
        );
    }

    changelog.entries.insert(
        0,
        ChangelogEntry {
            version: version.to_string(),
            date: Utc::now().format("%a, %d %b %Y").to_string(),
            comments: grouped,
        },
    );
    changelog.save(folder).map_err(|e| ChangeError::Changelog {
        package: package_name.to_string(),
        error: e.to_string(),
    })
}
