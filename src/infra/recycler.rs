//! Asynchronous folder teardown
//!
//! Deleting a large installed module tree can take longer than the
//! install that replaces it. Folders slated for deletion are renamed
//! into a recycler folder first (a metadata-only operation), and the
//! actual deletion runs in background threads that are drained before
//! the process exits.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crate::error::FilesystemError;
use crate::infra::filesystem;

/// Moves folders aside now, deletes them later
#[derive(Debug)]
pub struct Recycler {
    recycler_folder: PathBuf,
    sequence: u64,
    workers: Vec<JoinHandle<()>>,
}

impl Recycler {
    /// Create a recycler rooted at `recycler_folder`
    pub fn new(recycler_folder: PathBuf) -> Self {
        Self {
            recycler_folder,
            sequence: 0,
            workers: Vec::new(),
        }
    }

    /// Move `folder` into the recycler. Cheap; no data is deleted yet.
    pub fn discard(&mut self, folder: &Path) -> Result<(), FilesystemError> {
        if !folder.exists() {
            return Ok(());
        }
        filesystem::create_dir_all(&self.recycler_folder)?;

        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "folder".to_string());
        self.sequence += 1;
        let grave = self
            .recycler_folder
            .join(format!("{name}.{}.deleting", self.sequence));

        filesystem::rename(folder, &grave)?;
        tracing::debug!("Recycled '{}' as '{}'", folder.display(), grave.display());
        Ok(())
    }

    /// Start deleting everything currently in the recycler.
    ///
    /// Kicked off before the expensive install step so deletion overlaps
    /// with the installer's work.
    pub fn start_cleanup(&mut self) {
        let folder = self.recycler_folder.clone();
        if !folder.exists() {
            return;
        }
        let entries: Vec<PathBuf> = match std::fs::read_dir(&folder) {
            Ok(iter) => iter
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .collect(),
            Err(_) => return,
        };
        for grave in entries {
            self.workers.push(std::thread::spawn(move || {
                if let Err(e) = std::fs::remove_dir_all(&grave) {
                    tracing::warn!("Failed to empty recycler entry '{}': {e}", grave.display());
                }
            }));
        }
    }

    /// Block until all background deletions finish
    pub fn drain(&mut self) {
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for Recycler {
    fn drop(&mut self) {
        self.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_discard_moves_folder_aside() {
        let tmp = TempDir::new().unwrap();
        let victim = tmp.path().join("node_modules");
        std::fs::create_dir_all(victim.join("lodash")).unwrap();
        std::fs::write(victim.join("lodash/index.js"), "x").unwrap();

        let mut recycler = Recycler::new(tmp.path().join("recycler"));
        recycler.discard(&victim).unwrap();

        assert!(!victim.exists(), "folder is gone from its original place");
        let graves: Vec<_> = std::fs::read_dir(tmp.path().join("recycler"))
            .unwrap()
            .collect();
        assert_eq!(graves.len(), 1, "exactly one grave in the recycler");
    }

    #[test]
    fn test_cleanup_empties_recycler() {
        let tmp = TempDir::new().unwrap();
        let victim = tmp.path().join("stale");
        std::fs::create_dir_all(&victim).unwrap();

        let mut recycler = Recycler::new(tmp.path().join("recycler"));
        recycler.discard(&victim).unwrap();
        recycler.start_cleanup();
        recycler.drain();

        let remaining = std::fs::read_dir(tmp.path().join("recycler"))
            .map(|iter| iter.count())
            .unwrap_or(0);
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_discard_missing_is_ok() {
        let tmp = TempDir::new().unwrap();
        let mut recycler = Recycler::new(tmp.path().join("recycler"));
        recycler.discard(&tmp.path().join("absent")).unwrap();
    }
}
