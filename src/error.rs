//! Error types for monorail
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Workspace loading and validation errors
#[derive(Error, Debug)]
pub enum WorkspaceError {
    /// Repository manifest not found
    #[error("Repository manifest not found at '{path}'. Run monorail from the repository root.")]
    ConfigNotFound { path: PathBuf },

    /// Repository manifest parse error
    #[error("Failed to parse repository manifest: {error}")]
    ConfigParse { error: String },

    /// Schema violation in the repository manifest
    #[error("Invalid repository manifest: {message}")]
    ConfigInvalid { message: String },

    /// Project folder does not exist on disk
    #[error("Project folder not found: {folder} (project '{project}')")]
    FolderMissing { project: String, folder: PathBuf },

    /// package.json name differs from the registered project name
    #[error("Project '{project}' declares manifest name '{manifest_name}'; the two must match")]
    NameMismatch {
        project: String,
        manifest_name: String,
    },

    /// Two scoped projects collapse to the same unscoped temp name
    #[error("Projects '{first}' and '{second}' share the unscoped name '{unscoped}'")]
    TempNameCollision {
        first: String,
        second: String,
        unscoped: String,
    },

    /// Reference to a version policy that is not defined
    #[error("Project '{project}' references unknown version policy '{policy}'")]
    UnknownPolicy { project: String, policy: String },

    /// Local dependency declared with a range its workspace version cannot satisfy
    #[error(
        "Project '{project}' depends on local project '{dependency}' with range '{range}', \
         but its version is {version}. Add it to cyclicDependencyProjects or widen the range."
    )]
    LocalRangeUnsatisfied {
        project: String,
        dependency: String,
        range: String,
        version: String,
    },

    /// Dependency cycle among non-exempt local dependencies
    #[error("Circular dependency among projects: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// Project manifest error
    #[error("Failed to load manifest for project '{project}': {error}")]
    ProjectManifest { project: String, error: String },
}

/// Lockfile query errors
#[derive(Error, Debug)]
pub enum LockfileError {
    /// Lockfile missing on disk
    #[error("Lockfile not found at '{path}'")]
    NotFound { path: PathBuf },

    /// Lockfile is not valid JSON
    #[error("Failed to parse lockfile '{path}': {error}")]
    Parse { path: PathBuf, error: String },
}

/// Install planning errors
#[derive(Error, Debug)]
pub enum PlanError {
    /// Conflicting explicit and implicit pins are a configuration problem
    #[error("Pinned version for '{name}' is not a usable specifier: {reason}")]
    BadPin { name: String, reason: String },

    /// Stub archive IO error
    #[error("Failed to write stub archive '{path}': {error}")]
    StubArchive { path: PathBuf, error: String },

    /// Common manifest IO error
    #[error("Failed to write common manifest '{path}': {error}")]
    CommonManifest { path: PathBuf, error: String },
}

/// Installer driver errors
#[derive(Error, Debug)]
pub enum InstallError {
    /// The installer command failed after the retry budget was exhausted
    #[error("Installer failed after {attempts} attempts: {command}")]
    InstallerFailed { command: String, attempts: u32 },

    /// IO error during install orchestration
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// Local linking errors
#[derive(Error, Debug)]
pub enum LinkError {
    /// Symlink creation failed
    #[error("Failed to link '{target}' into '{consumer}': {error}")]
    Symlink {
        consumer: String,
        target: String,
        error: String,
    },

    /// IO error while preparing link folders
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// Change-hash analyzer errors
#[derive(Error, Debug)]
pub enum HashError {
    /// Could not read a tracked file
    #[error("Failed to hash '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Could not persist or load the fingerprint record
    #[error("Failed to access fingerprint file '{path}': {error}")]
    Record { path: PathBuf, error: String },
}

/// Task scheduler errors
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Task registered twice
    #[error("A task named '{name}' is already registered")]
    DuplicateTask { name: String },

    /// Dependency wired to a task that does not exist
    #[error("Task '{name}' depends on unknown task '{dependency}'")]
    UnknownDependency { name: String, dependency: String },

    /// Cycle in the task graph
    #[error("Circular task dependency: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// One or more tasks failed
    #[error("{failed} task(s) failed, {blocked} blocked")]
    TasksFailed { failed: usize, blocked: usize },
}

/// Version policy errors
#[derive(Error, Debug)]
pub enum PolicyError {
    /// Version ahead of the lock-step policy version
    #[error(
        "Package '{package}' is at {version}, ahead of lock-step policy '{policy}' ({policy_version}). \
         Lock-step members may not run ahead of the policy."
    )]
    AheadOfLockStep {
        package: String,
        version: String,
        policy: String,
        policy_version: String,
    },

    /// Version does not equal the lock-step policy version
    #[error("Version {version} of '{package}' does not match lock-step policy '{policy}' ({expected})")]
    LockStepMismatch {
        package: String,
        version: String,
        policy: String,
        expected: String,
    },

    /// Major version above an individual policy's locked major
    #[error("Package '{package}' is at {version}, above the locked major {locked_major} of policy '{policy}'")]
    AboveLockedMajor {
        package: String,
        version: String,
        policy: String,
        locked_major: u64,
    },

    /// Unparseable version or bump input
    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    /// Policy file problems
    #[error("Failed to load version policies from '{path}': {error}")]
    Load { path: PathBuf, error: String },
}

/// Change pipeline errors
#[derive(Error, Debug)]
pub enum ChangeError {
    /// Change file parse failure
    #[error("Failed to parse change file '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Change file names a package that is not in the workspace
    #[error("Change file '{path}' references unknown package '{package}'")]
    UnknownPackage { path: PathBuf, package: String },

    /// IO while reading or consuming change files
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },

    /// Changelog write failure
    #[error("Failed to write changelog for '{package}': {error}")]
    Changelog { package: String, error: String },
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to rename a path
    #[error("Failed to move '{from}' to '{to}': {error}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },
}

/// Top-level monorail error type.
///
/// The CLI layer converts domain errors into this sum type so every
/// failure renders with a consistent prefix.
#[derive(Error, Debug)]
pub enum MonorailError {
    /// Workspace error
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    /// Lockfile error
    #[error("Lockfile error: {0}")]
    Lockfile(#[from] LockfileError),

    /// Install plan error
    #[error("Install plan error: {0}")]
    Plan(#[from] PlanError),

    /// Install error
    #[error("Install error: {0}")]
    Install(#[from] InstallError),

    /// Link error
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// Fingerprint error
    #[error("Fingerprint error: {0}")]
    Hash(#[from] HashError),

    /// Scheduler error
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Version policy error
    #[error("Version policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Change pipeline error
    #[error("Change error: {0}")]
    Change(#[from] ChangeError),

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),
}
