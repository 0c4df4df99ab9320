//! Project fingerprinting
//!
//! A project's fingerprint maps every tracked source file to a content
//! hash and records the exact build command line. A build may be skipped
//! only when the whole record matches the one persisted by the last
//! successful build; any doubt (IO failure, missing record) means
//! rebuild.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::config::defaults::{
    BUILD_ERROR_LOG_FILENAME, BUILD_LOG_FILENAME, FINGERPRINT_FILENAME,
};
use crate::error::HashError;

/// Folders never included in a fingerprint
const IGNORED_FOLDERS: &[&str] = &["node_modules", ".git", "temp", "dist", "lib", "coverage"];

/// The persisted fingerprint record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFingerprint {
    /// Relative file path -> hex content hash
    pub files: BTreeMap<String, String>,
    /// The build command line the record was produced under
    pub arguments: String,
}

impl ProjectFingerprint {
    /// Hash every tracked file under `project_folder`.
    ///
    /// Files are keyed by their path relative to the project folder,
    /// with `/` separators, so records are portable across checkouts.
    pub fn compute(project_folder: &Path, arguments: &str) -> Result<Self, HashError> {
        let mut files = BTreeMap::new();

        for entry in WalkDir::new(project_folder)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_ignored(e))
        {
            let entry = entry.map_err(|e| HashError::ReadFile {
                path: project_folder.to_path_buf(),
                error: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(project_folder)
                .expect("walked entries live under the project folder");
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let content = std::fs::read(entry.path()).map_err(|e| HashError::ReadFile {
                path: entry.path().to_path_buf(),
                error: e.to_string(),
            })?;
            files.insert(key, hex_digest(&content));
        }

        Ok(Self {
            files,
            arguments: arguments.to_string(),
        })
    }

    /// Path of the record file for a project folder
    pub fn record_path(project_folder: &Path) -> PathBuf {
        project_folder.join(FINGERPRINT_FILENAME)
    }

    /// Load the record persisted by the last successful build, if any.
    ///
    /// A corrupt record is treated as absent; the caller rebuilds.
    pub fn load(project_folder: &Path) -> Option<Self> {
        let path = Self::record_path(project_folder);
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Persist the record. Called only after a successful build.
    pub fn save(&self, project_folder: &Path) -> Result<(), HashError> {
        let path = Self::record_path(project_folder);
        let mut content = serde_json::to_string_pretty(self).map_err(|e| HashError::Record {
            path: path.clone(),
            error: e.to_string(),
        })?;
        content.push('\n');
        std::fs::write(&path, content).map_err(|e| HashError::Record {
            path,
            error: e.to_string(),
        })
    }

    /// Delete the record so an interrupted build cannot be mistaken for
    /// a finished one.
    pub fn invalidate(project_folder: &Path) -> Result<(), HashError> {
        let path = Self::record_path(project_folder);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| HashError::Record {
                path,
                error: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Equal keyset, equal hash per key, equal command line
    pub fn matches(&self, other: &Self) -> bool {
        self == other
    }
}

fn is_ignored(entry: &walkdir::DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if entry.file_type().is_dir() {
        return IGNORED_FOLDERS.contains(&name.as_ref());
    }
    // The record and log files would otherwise invalidate themselves
    name == FINGERPRINT_FILENAME || name == BUILD_LOG_FILENAME || name == BUILD_ERROR_LOG_FILENAME
}

fn hex_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(tmp: &TempDir) -> PathBuf {
        let folder = tmp.path().join("proj");
        std::fs::create_dir_all(folder.join("src")).unwrap();
        std::fs::write(folder.join("src/a.ts"), "export const a = 1;").unwrap();
        std::fs::write(folder.join("src/b.ts"), "export const b = 2;").unwrap();
        folder
    }

    #[test]
    fn test_stable_across_runs() {
        let tmp = TempDir::new().unwrap();
        let folder = project(&tmp);
        let one = ProjectFingerprint::compute(&folder, "build --production").unwrap();
        let two = ProjectFingerprint::compute(&folder, "build --production").unwrap();
        assert!(one.matches(&two));
        assert_eq!(one.files.len(), 2);
        assert!(one.files.contains_key("src/a.ts"));
    }

    #[test]
    fn test_content_change_detected() {
        let tmp = TempDir::new().unwrap();
        let folder = project(&tmp);
        let before = ProjectFingerprint::compute(&folder, "build").unwrap();
        std::fs::write(folder.join("src/a.ts"), "export const a = 99;").unwrap();
        let after = ProjectFingerprint::compute(&folder, "build").unwrap();
        assert!(!before.matches(&after));
        assert_ne!(before.files["src/a.ts"], after.files["src/a.ts"]);
        assert_eq!(before.files["src/b.ts"], after.files["src/b.ts"]);
    }

    #[test]
    fn test_argument_change_detected() {
        let tmp = TempDir::new().unwrap();
        let folder = project(&tmp);
        let one = ProjectFingerprint::compute(&folder, "build").unwrap();
        let two = ProjectFingerprint::compute(&folder, "build --production").unwrap();
        assert!(!one.matches(&two));
    }

    #[test]
    fn test_keyset_change_detected() {
        let tmp = TempDir::new().unwrap();
        let folder = project(&tmp);
        let before = ProjectFingerprint::compute(&folder, "build").unwrap();
        std::fs::write(folder.join("src/c.ts"), "export const c = 3;").unwrap();
        let after = ProjectFingerprint::compute(&folder, "build").unwrap();
        assert!(!before.matches(&after));
    }

    #[test]
    fn test_ignored_folders_and_record_file() {
        let tmp = TempDir::new().unwrap();
        let folder = project(&tmp);
        std::fs::create_dir_all(folder.join("node_modules/x")).unwrap();
        std::fs::write(folder.join("node_modules/x/i.js"), "ignored").unwrap();

        let fingerprint = ProjectFingerprint::compute(&folder, "build").unwrap();
        fingerprint.save(&folder).unwrap();

        let again = ProjectFingerprint::compute(&folder, "build").unwrap();
        assert!(
            fingerprint.matches(&again),
            "the record file itself is not tracked"
        );
        assert!(again.files.keys().all(|k| !k.starts_with("node_modules")));
    }

    #[test]
    fn test_save_load_invalidate() {
        let tmp = TempDir::new().unwrap();
        let folder = project(&tmp);
        let fingerprint = ProjectFingerprint::compute(&folder, "build").unwrap();

        assert!(ProjectFingerprint::load(&folder).is_none());
        fingerprint.save(&folder).unwrap();
        let loaded = ProjectFingerprint::load(&folder).expect("record exists");
        assert!(fingerprint.matches(&loaded));

        ProjectFingerprint::invalidate(&folder).unwrap();
        assert!(ProjectFingerprint::load(&folder).is_none());
    }
}
