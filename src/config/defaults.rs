//! Default configuration values

/// Reserved scope under which per-project stub packages are registered
pub const TEMP_SCOPE: &str = "@mono-tmp";

/// Repository manifest file name
pub const REPO_CONFIG_FILENAME: &str = "monorail.json";

/// Version policy file, relative to the repository root
pub const VERSION_POLICY_PATH: &str = "common/config/version-policies.json";

/// Folder holding pending change files, relative to the repository root
pub const CHANGES_FOLDER: &str = "changes";

/// Common state folder, relative to the repository root
pub const COMMON_FOLDER: &str = "common";

/// Scratch folder under `common/` for synthesized install state
pub const COMMON_TEMP_FOLDER: &str = "common/temp";

/// Stub archive folder under the scratch folder
pub const STUB_PROJECTS_FOLDER: &str = "common/temp/projects";

/// Working copy of the committed lockfile
pub const WORKING_LOCKFILE_PATH: &str = "common/temp/npm-shrinkwrap.json";

/// Synthesized common manifest
pub const COMMON_MANIFEST_PATH: &str = "common/temp/package.json";

/// Marker recording the last successful install
pub const LAST_INSTALL_FLAG: &str = "common/temp/last-install.flag";

/// Marker recording the last successful link pass
pub const LAST_LINK_FLAG: &str = "common/temp/last-link.flag";

/// Recycler folder for asynchronous folder teardown
pub const RECYCLER_FOLDER: &str = "common/temp/recycler";

/// Shared third-party module tree produced by the installer
pub const COMMON_MODULES_FOLDER: &str = "common/temp/node_modules";

/// Per-project fingerprint record file name
pub const FINGERPRINT_FILENAME: &str = "package-deps.json";

/// Per-project build log file names
pub const BUILD_LOG_FILENAME: &str = "monorail.build.log";
pub const BUILD_ERROR_LOG_FILENAME: &str = "monorail.build.error.log";

/// Maximum installer invocation attempts
pub const MAX_INSTALL_ATTEMPTS: u32 = 5;

/// Bounded retries for transient filesystem operations
pub const MAX_FS_RETRIES: u32 = 3;

/// Name of the synthesized common package
pub const COMMON_PACKAGE_NAME: &str = "monorail-common";
