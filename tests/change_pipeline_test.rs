//! Integration tests for the change-request pipeline
//!
//! Covers aggregation, downstream propagation with range satisfaction,
//! order stamping, manifest rewriting, and changelog emission.

mod common;

use common::TestRepo;
use monorail::core::changes::{self, ChangeKind, PipelineOptions};
use monorail::core::workspace::Workspace;

/// A@1.0.0 <- B@1.0.0 <- C@1.0.0, all publishable. `a_range` is the
/// range B declares on A.
fn chain_repo(a_range: &str) -> TestRepo {
    let repo = TestRepo::new();
    repo.create_project("libs/a", r#"{ "name": "a", "version": "1.0.0" }"#);
    repo.create_project(
        "libs/b",
        &format!(
            r#"{{ "name": "b", "version": "1.0.0",
                  "dependencies": {{ "a": "{a_range}" }} }}"#
        ),
    );
    repo.create_project(
        "libs/c",
        r#"{ "name": "c", "version": "1.0.0",
             "dependencies": { "b": "^1.0.0" } }"#,
    );
    repo.write_repo_config_with(
        &[("a", "libs/a"), ("b", "libs/b"), ("c", "libs/c")],
        &["a", "b", "c"],
    );
    repo.create_file(
        "changes/feature/a.json",
        r#"{
    "packageName": "a",
    "changes": [
        { "packageName": "a", "type": "minor", "comment": "Add widgets" }
    ]
}"#,
    );
    repo
}

#[test]
fn test_propagation_with_satisfied_range() {
    let repo = chain_repo("^1.0.0");
    let mut ws = Workspace::load(&repo.path()).unwrap();

    let result = changes::execute(
        &mut ws,
        &repo.path().join("changes"),
        &PipelineOptions::default(),
    )
    .unwrap();

    let by_name = |name: &str| {
        result
            .applied
            .iter()
            .find(|c| c.package_name == name)
            .unwrap_or_else(|| panic!("{name} missing from the applied set"))
    };

    // A bumps minor; ^1.0.0 still covers 1.1.0, so B and C only record
    // dependency-kind changes
    let a = by_name("a");
    assert_eq!(a.kind, ChangeKind::Minor);
    assert_eq!(a.new_version.to_string(), "1.1.0");
    assert_eq!(a.order, 0);

    let b = by_name("b");
    assert_eq!(b.kind, ChangeKind::Dependency);
    assert_eq!(b.new_version.to_string(), "1.0.0");
    assert_eq!(b.order, 1);

    let c = by_name("c");
    assert_eq!(c.kind, ChangeKind::Dependency);
    assert_eq!(c.order, 2);

    // Application order follows the stamps
    let names: Vec<&str> = result.applied.iter().map(|c| c.package_name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn test_propagation_with_range_mismatch() {
    let repo = chain_repo("^0.9.0");
    let mut ws = Workspace::load(&repo.path()).unwrap();

    let result = changes::execute(
        &mut ws,
        &repo.path().join("changes"),
        &PipelineOptions::default(),
    )
    .unwrap();

    let by_name = |name: &str| {
        result
            .applied
            .iter()
            .find(|c| c.package_name == name)
            .unwrap()
    };

    // A@1.1.0 breaks ^0.9.0, so B takes a patch; C is still covered
    let b = by_name("b");
    assert_eq!(b.kind, ChangeKind::Patch);
    assert_eq!(b.new_version.to_string(), "1.0.1");

    let c = by_name("c");
    assert_eq!(c.kind, ChangeKind::Dependency);
}

#[test]
fn test_apply_rewrites_manifests_and_changelogs() {
    let repo = chain_repo("^0.9.0");
    let mut ws = Workspace::load(&repo.path()).unwrap();

    changes::execute(
        &mut ws,
        &repo.path().join("changes"),
        &PipelineOptions::default(),
    )
    .unwrap();

    // A's version moved on disk
    let a_manifest = repo.read_file("libs/a/package.json");
    assert!(a_manifest.contains("\"1.1.0\""), "{a_manifest}");

    // B picked up the patch and a prefix-preserving range rewrite
    let b_manifest = repo.read_file("libs/b/package.json");
    assert!(b_manifest.contains("\"1.0.1\""), "{b_manifest}");
    assert!(b_manifest.contains("\"a\": \"^1.1.0\""), "{b_manifest}");

    // Changelogs exist for the bumped packages
    assert!(repo.file_exists("libs/a/CHANGELOG.json"));
    assert!(repo.file_exists("libs/a/CHANGELOG.md"));
    let a_changelog = repo.read_file("libs/a/CHANGELOG.md");
    assert!(a_changelog.contains("Add widgets"));
    assert!(repo.file_exists("libs/b/CHANGELOG.json"));

    // C's version never moved: no changelog entry for it
    assert!(!repo.file_exists("libs/c/CHANGELOG.json"));

    // Change files were consumed
    assert!(!repo.file_exists("changes/feature/a.json"));
}

#[test]
fn test_dry_run_touches_nothing() {
    let repo = chain_repo("^1.0.0");
    let mut ws = Workspace::load(&repo.path()).unwrap();

    let options = PipelineOptions {
        dry_run: true,
        ..PipelineOptions::default()
    };
    let result = changes::execute(&mut ws, &repo.path().join("changes"), &options).unwrap();

    assert!(!result.applied.is_empty());
    assert!(repo.file_exists("changes/feature/a.json"), "dry run keeps change files");
    let a_manifest = repo.read_file("libs/a/package.json");
    assert!(a_manifest.contains("\"1.0.0\""), "dry run keeps versions");
    assert!(!repo.file_exists("libs/a/CHANGELOG.json"));
}

#[test]
fn test_unpublishable_package_is_skipped() {
    let repo = TestRepo::new();
    repo.create_project("libs/a", r#"{ "name": "a", "version": "1.0.0" }"#);
    // a is NOT marked publishable
    repo.write_repo_config(&[("a", "libs/a")]);
    repo.create_file(
        "changes/a.json",
        r#"{
    "packageName": "a",
    "changes": [ { "packageName": "a", "type": "major", "comment": "big" } ]
}"#,
    );

    let mut ws = Workspace::load(&repo.path()).unwrap();
    let result = changes::execute(
        &mut ws,
        &repo.path().join("changes"),
        &PipelineOptions::default(),
    )
    .unwrap();

    assert!(
        result.applied.is_empty(),
        "a skipped package records no applied change: {:?}",
        result.applied
    );
    let a_manifest = repo.read_file("libs/a/package.json");
    assert!(a_manifest.contains("\"1.0.0\""));
}

#[test]
fn test_excluded_package_holds_version_but_aggregation_continues() {
    let repo = chain_repo("^1.0.0");
    let mut ws = Workspace::load(&repo.path()).unwrap();

    let options = PipelineOptions {
        exclude: ["a".to_string()].into_iter().collect(),
        ..PipelineOptions::default()
    };
    let result = changes::execute(&mut ws, &repo.path().join("changes"), &options).unwrap();

    // The excluded package neither bumps nor propagates
    assert!(result.applied.iter().all(|c| !c.version_changed()));
    let a_manifest = repo.read_file("libs/a/package.json");
    assert!(a_manifest.contains("\"1.0.0\""));
}

#[test]
fn test_aggregation_takes_maximum_kind() {
    let repo = TestRepo::new();
    repo.create_project("libs/a", r#"{ "name": "a", "version": "1.0.0" }"#);
    repo.write_repo_config_with(&[("a", "libs/a")], &["a"]);
    repo.create_file(
        "changes/one.json",
        r#"{
    "packageName": "a",
    "changes": [
        { "packageName": "a", "type": "patch", "comment": "fix one" },
        { "packageName": "a", "type": "major", "comment": "break things" }
    ]
}"#,
    );
    repo.create_file(
        "changes/two.json",
        r#"{
    "packageName": "a",
    "changes": [ { "packageName": "a", "type": "minor", "comment": "add two" } ]
}"#,
    );

    let mut ws = Workspace::load(&repo.path()).unwrap();
    let result = changes::execute(
        &mut ws,
        &repo.path().join("changes"),
        &PipelineOptions::default(),
    )
    .unwrap();

    assert_eq!(result.applied.len(), 1);
    assert_eq!(result.applied[0].kind, ChangeKind::Major);
    assert_eq!(result.applied[0].new_version.to_string(), "2.0.0");

    // All three comments survive, grouped by their incoming kind
    let changelog = repo.read_file("libs/a/CHANGELOG.md");
    assert!(changelog.contains("fix one"));
    assert!(changelog.contains("break things"));
    assert!(changelog.contains("add two"));
}
