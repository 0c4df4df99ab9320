//! Change command implementation
//!
//! Implements `monorail change --verify`: validate that pending change
//! files parse and reference known packages. Authoring change files is
//! done by contributors at commit time; this command is the CI gate.

use std::path::Path;

use anyhow::{bail, Result};

use crate::cli::output;
use crate::config::defaults::CHANGES_FOLDER;
use crate::core::changes;
use crate::core::workspace::Workspace;
use crate::error::MonorailError;

/// Execute the change command
pub async fn execute(repo_root: &Path, verify: bool) -> Result<()> {
    let workspace = Workspace::load(repo_root).map_err(MonorailError::from)?;
    let folder = repo_root.join(CHANGES_FOLDER);

    let files = match changes::read_change_files(&workspace, &folder) {
        Ok(files) => files,
        Err(e) if verify => bail!("Change verification failed: {e}"),
        Err(e) => {
            eprintln!("{} {e}", output::status::ERROR);
            return Ok(());
        }
    };

    if files.is_empty() {
        println!("{} No pending change files", output::status::INFO);
        return Ok(());
    }

    println!("{} pending change file(s):", files.len());
    for (path, file) in &files {
        let relative = path.strip_prefix(repo_root).unwrap_or(path);
        println!("  {} ({} change(s))", relative.display(), file.changes.len());
        for change in &file.changes {
            println!("    {} -> {:?}", change.package_name, change.kind);
        }
    }

    if verify {
        println!("{} All change files are valid", output::status::SUCCESS);
    }
    Ok(())
}
