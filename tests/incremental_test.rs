//! Integration tests for incremental builds
//!
//! Runs real build tasks through the scheduler against a temp repo and
//! checks the skip/rebuild decisions end to end.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::TestRepo;
use monorail::core::build_task::{BuildFlags, BuildTask};
use monorail::core::change_hash::ProjectFingerprint;
use monorail::core::diagnostics::DisplayMode;
use monorail::core::scheduler::{TaskScheduler, TaskStatus};

fn project_with_sources(repo: &TestRepo, folder: &str) -> PathBuf {
    repo.create_dir(&format!("{folder}/src"));
    repo.create_file(&format!("{folder}/src/a.ts"), "export const a = 1;");
    repo.create_file(&format!("{folder}/src/b.ts"), "export const b = 2;");
    repo.path().join(folder)
}

fn build_task(folder: &PathBuf, incremental: bool) -> Arc<BuildTask> {
    Arc::new(BuildTask::new(
        "proj",
        folder.clone(),
        Some("true".to_string()),
        None,
        Some("echo built".to_string()),
        BuildFlags::default(),
        incremental,
    ))
}

async fn run_once(folder: &PathBuf, incremental: bool) -> TaskStatus {
    let mut scheduler = TaskScheduler::new(1, DisplayMode::Local).quiet();
    scheduler.add_task("proj", build_task(folder, incremental)).unwrap();
    scheduler.execute().await.unwrap();
    scheduler.status_of("proj").unwrap()
}

#[tokio::test]
async fn test_unchanged_project_is_skipped() {
    let repo = TestRepo::new();
    let folder = project_with_sources(&repo, "libs/proj");

    assert_eq!(run_once(&folder, true).await, TaskStatus::Success);
    assert!(ProjectFingerprint::load(&folder).is_some());

    // Same files, same hashes, same arguments: skipped without running
    assert_eq!(run_once(&folder, true).await, TaskStatus::Skipped);
}

#[tokio::test]
async fn test_modified_source_rebuilds() {
    let repo = TestRepo::new();
    let folder = project_with_sources(&repo, "libs/proj");

    assert_eq!(run_once(&folder, true).await, TaskStatus::Success);

    repo.create_file("libs/proj/src/a.ts", "export const a = 42;");
    assert_eq!(
        run_once(&folder, true).await,
        TaskStatus::Success,
        "a hash change forces clean + build"
    );
}

#[tokio::test]
async fn test_clean_build_ignores_fingerprints() {
    let repo = TestRepo::new();
    let folder = project_with_sources(&repo, "libs/proj");

    assert_eq!(run_once(&folder, true).await, TaskStatus::Success);
    // rebuild semantics: incremental disabled
    assert_eq!(run_once(&folder, false).await, TaskStatus::Success);
}

#[tokio::test]
async fn test_upstream_success_invalidates_downstream_skip() {
    let repo = TestRepo::new();
    let up_folder = project_with_sources(&repo, "libs/up");
    let down_folder = project_with_sources(&repo, "libs/down");

    // Prime both fingerprints
    assert_eq!(run_once(&up_folder, true).await, TaskStatus::Success);
    assert_eq!(run_once(&down_folder, true).await, TaskStatus::Success);

    // Touch only the upstream project
    repo.create_file("libs/up/src/a.ts", "export const a = 9;");

    let mut scheduler = TaskScheduler::new(2, DisplayMode::Local).quiet();
    scheduler
        .add_task(
            "up",
            Arc::new(BuildTask::new(
                "up",
                up_folder.clone(),
                Some("true".to_string()),
                None,
                Some("echo built".to_string()),
                BuildFlags::default(),
                true,
            )),
        )
        .unwrap();
    scheduler
        .add_task(
            "down",
            Arc::new(BuildTask::new(
                "down",
                down_folder.clone(),
                Some("true".to_string()),
                None,
                Some("echo built".to_string()),
                BuildFlags::default(),
                true,
            )),
        )
        .unwrap();
    scheduler.add_dependencies("down", &["up"]).unwrap();
    scheduler.execute().await.unwrap();

    assert_eq!(scheduler.status_of("up"), Some(TaskStatus::Success));
    assert_eq!(
        scheduler.status_of("down"),
        Some(TaskStatus::Success),
        "an upstream rebuild forbids the downstream skip"
    );
}

#[tokio::test]
async fn test_upstream_skip_preserves_downstream_skip() {
    let repo = TestRepo::new();
    let up_folder = project_with_sources(&repo, "libs/up");
    let down_folder = project_with_sources(&repo, "libs/down");

    assert_eq!(run_once(&up_folder, true).await, TaskStatus::Success);
    assert_eq!(run_once(&down_folder, true).await, TaskStatus::Success);

    let mut scheduler = TaskScheduler::new(2, DisplayMode::Local).quiet();
    scheduler.add_task("up", build_task(&up_folder, true)).unwrap();
    scheduler.add_task("down", build_task(&down_folder, true)).unwrap();
    scheduler.add_dependencies("down", &["up"]).unwrap();
    scheduler.execute().await.unwrap();

    assert_eq!(scheduler.status_of("up"), Some(TaskStatus::Skipped));
    assert_eq!(
        scheduler.status_of("down"),
        Some(TaskStatus::Skipped),
        "a skipped parent leaves the child skippable"
    );
}

#[tokio::test]
async fn test_failed_build_leaves_no_fingerprint_then_recovers() {
    let repo = TestRepo::new();
    let folder = project_with_sources(&repo, "libs/proj");

    let mut scheduler = TaskScheduler::new(1, DisplayMode::Local).quiet();
    scheduler
        .add_task(
            "proj",
            Arc::new(BuildTask::new(
                "proj",
                folder.clone(),
                Some("true".to_string()),
                None,
                Some("exit 1".to_string()),
                BuildFlags::default(),
                true,
            )),
        )
        .unwrap();
    assert!(scheduler.execute().await.is_err());
    assert_eq!(scheduler.status_of("proj"), Some(TaskStatus::Failure));
    assert!(
        ProjectFingerprint::load(&folder).is_none(),
        "the fingerprint exists only after a success"
    );

    // The next good build starts from scratch and persists the record
    assert_eq!(run_once(&folder, true).await, TaskStatus::Success);
    assert!(ProjectFingerprint::load(&folder).is_some());
}
