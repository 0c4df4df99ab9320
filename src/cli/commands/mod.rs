//! CLI command implementations
//!
//! Each action verb is implemented in its own submodule.

pub mod build;
pub mod change;
pub mod check;
pub mod generate;
pub mod install;
pub mod link;
pub mod publish;
pub mod scan;
pub mod version;

use std::path::Path;

use anyhow::Result;
use clap::Subcommand;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install the shared dependency tree and link local projects
    Install {
        /// Recycle the installed tree and caches before installing
        #[arg(long)]
        clean: bool,

        /// Additionally purge the installer tool itself
        #[arg(long)]
        full_clean: bool,

        /// Skip the approved-packages policy checks
        #[arg(long)]
        bypass_policy: bool,

        /// Do not create local project links after installing
        #[arg(long)]
        no_link: bool,
    },

    /// Build every project, honoring the dependency graph
    Build {
        /// Build only this project and its dependencies
        #[arg(long, value_name = "PROJECT")]
        to: Option<String>,

        /// Build only this project and its dependents
        #[arg(long, value_name = "PROJECT")]
        from: Option<String>,

        /// Maximum concurrent project builds (default: CPU count)
        #[arg(short, long, default_value = "0")]
        parallelism: usize,

        /// Pass --production to project build scripts
        #[arg(long)]
        production: bool,

        /// Pass --npm to project build scripts
        #[arg(long)]
        npm: bool,

        /// Pass --minimal to project build scripts
        #[arg(long)]
        minimal: bool,

        /// Emit CI issue-linked diagnostics
        #[arg(long)]
        vso: bool,

        /// Ignore fingerprints and rebuild everything
        #[arg(long)]
        clean: bool,
    },

    /// Clean build of every project (build --clean)
    Rebuild {
        /// Build only this project and its dependencies
        #[arg(long, value_name = "PROJECT")]
        to: Option<String>,

        /// Build only this project and its dependents
        #[arg(long, value_name = "PROJECT")]
        from: Option<String>,

        /// Maximum concurrent project builds (default: CPU count)
        #[arg(short, long, default_value = "0")]
        parallelism: usize,

        /// Pass --production to project build scripts
        #[arg(long)]
        production: bool,

        /// Pass --npm to project build scripts
        #[arg(long)]
        npm: bool,

        /// Pass --minimal to project build scripts
        #[arg(long)]
        minimal: bool,

        /// Emit CI issue-linked diagnostics
        #[arg(long)]
        vso: bool,
    },

    /// Create local project symlinks from the last install plan
    Link,

    /// Remove local project symlinks
    Unlink,

    /// Regenerate the install plan and lockfile from scratch
    Generate,

    /// Validate pending change files
    Change {
        /// Fail when change files are missing or invalid
        #[arg(long)]
        verify: bool,
    },

    /// Apply version policies to project manifests
    Version {
        /// Bump lock-step policies before ensuring members
        #[arg(long)]
        bump: bool,

        /// Bump only this policy
        #[arg(long, value_name = "POLICY")]
        version_policy: Option<String>,

        /// Override the policy's configured bump kind
        #[arg(long, value_name = "KIND")]
        override_bump: Option<String>,

        /// Prerelease identifier for prerelease bumps
        #[arg(long, value_name = "ID")]
        override_prerelease_id: Option<String>,
    },

    /// Consume change files: bump versions, write changelogs
    Publish {
        /// Apply changes to disk (default is a dry run)
        #[arg(long)]
        apply: bool,

        /// Suffix released versions with a prerelease token
        #[arg(long, value_name = "ID")]
        prerelease: Option<String>,

        /// Exclude a package from version bumps (repeatable)
        #[arg(long, value_name = "PACKAGE")]
        exclude: Vec<String>,
    },

    /// Validate the repository configuration without side effects
    Check,

    /// List projects whose fingerprints are stale
    Scan,
}

impl Commands {
    /// Execute the command
    pub async fn run(self) -> Result<()> {
        let repo_root = std::env::current_dir()?;
        match self {
            Self::Install {
                clean,
                full_clean,
                bypass_policy,
                no_link,
            } => {
                let options = install::InstallOptions {
                    clean,
                    full_clean,
                    bypass_policy,
                    no_link,
                };
                install::execute(&repo_root, options).await
            }
            Self::Build {
                to,
                from,
                parallelism,
                production,
                npm,
                minimal,
                vso,
                clean,
            } => {
                let options = build::BuildOptions {
                    to,
                    from,
                    parallelism,
                    production,
                    npm,
                    minimal,
                    vso,
                    clean,
                };
                build::execute(&repo_root, options).await
            }
            Self::Rebuild {
                to,
                from,
                parallelism,
                production,
                npm,
                minimal,
                vso,
            } => {
                let options = build::BuildOptions {
                    to,
                    from,
                    parallelism,
                    production,
                    npm,
                    minimal,
                    vso,
                    clean: true,
                };
                build::execute(&repo_root, options).await
            }
            Self::Link => link::execute_link(&repo_root).await,
            Self::Unlink => link::execute_unlink(&repo_root).await,
            Self::Generate => generate::execute(&repo_root).await,
            Self::Change { verify } => change::execute(&repo_root, verify).await,
            Self::Version {
                bump,
                version_policy,
                override_bump,
                override_prerelease_id,
            } => {
                version::execute(
                    &repo_root,
                    version::VersionOptions {
                        bump,
                        version_policy,
                        override_bump,
                        override_prerelease_id,
                    },
                )
                .await
            }
            Self::Publish {
                apply,
                prerelease,
                exclude,
            } => {
                publish::execute(
                    &repo_root,
                    publish::PublishOptions {
                        apply,
                        prerelease,
                        exclude,
                    },
                )
                .await
            }
            Self::Check => check::execute(&repo_root).await,
            Self::Scan => scan::execute(&repo_root).await,
        }
    }
}

/// Run a list of event-hook commands from the repository root.
///
/// Hook failures are warnings, not fatal errors.
pub(crate) fn run_event_hooks(label: &str, commands: &[String], repo_root: &Path) {
    for command in commands {
        tracing::info!("Running {label} hook: {command}");
        match crate::infra::process::run_shell(command, repo_root) {
            Ok(output) if output.success() => {}
            Ok(output) => {
                tracing::warn!("{label} hook '{command}' exited with code {}", output.exit_code);
            }
            Err(e) => tracing::warn!("{label} hook '{command}' could not start: {e}"),
        }
    }
}
