//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests. Not
//! every test binary uses every helper.
#![allow(dead_code)]

use std::path::PathBuf;
use tempfile::TempDir;

/// Test repository context
///
/// Creates a temporary directory for test monorepos and provides
/// utilities for setting up projects, change files, and policies.
pub struct TestRepo {
    /// Temporary directory holding the repository
    pub dir: TempDir,
}

impl TestRepo {
    /// Create a new empty test repository
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the repository root path
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the repository
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the repository
    pub fn create_dir(&self, name: &str) {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(path).expect("Failed to create directory");
    }

    /// Check if a file exists in the repository
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the repository
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Register a project folder with a package manifest
    pub fn create_project(&self, folder: &str, manifest_json: &str) {
        self.create_dir(folder);
        self.create_file(&format!("{folder}/package.json"), manifest_json);
    }

    /// Write the repository manifest with the given project entries
    pub fn write_repo_config(&self, project_entries: &[(&str, &str)]) {
        self.write_repo_config_with(project_entries, &[]);
    }

    /// Write the repository manifest, marking some projects publishable
    pub fn write_repo_config_with(
        &self,
        project_entries: &[(&str, &str)],
        publishable: &[&str],
    ) {
        let projects: Vec<String> = project_entries
            .iter()
            .map(|(name, folder)| {
                let publish = if publishable.contains(name) {
                    ", \"shouldPublish\": true"
                } else {
                    ""
                };
                format!(
                    r#"{{ "packageName": "{name}", "projectFolder": "{folder}"{publish} }}"#
                )
            })
            .collect();
        self.create_file(
            "monorail.json",
            &format!(
                r#"{{
    "installerToolName": "npm",
    "installerToolVersion": "10.5.0",
    "lockfilePath": "common/config/npm-shrinkwrap.json",
    "projects": [{}]
}}"#,
                projects.join(", ")
            ),
        );
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// Sample package manifest JSON for testing
pub fn manifest(name: &str, version: &str, deps: &[(&str, &str)]) -> String {
    let dep_entries: Vec<String> = deps
        .iter()
        .map(|(dep, range)| format!(r#""{dep}": "{range}""#))
        .collect();
    format!(
        r#"{{
    "name": "{name}",
    "version": "{version}",
    "dependencies": {{ {} }},
    "scripts": {{ "clean": "true", "build": "echo built" }}
}}"#,
        dep_entries.join(", ")
    )
}
