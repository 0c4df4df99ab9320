//! Filesystem operations
//!
//! File and directory primitives with typed errors. Directory creation
//! and removal are retried a bounded number of times; antivirus and
//! indexing services briefly hold handles on freshly-touched folders.

use std::path::Path;
use std::time::Duration;

use crate::config::defaults::MAX_FS_RETRIES;
use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    retry(|| std::fs::create_dir_all(path)).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a directory and all its contents
pub fn remove_dir_all(path: &Path) -> Result<(), FilesystemError> {
    if path.exists() {
        retry(|| std::fs::remove_dir_all(path)).map_err(|e| FilesystemError::RemoveDir {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

/// Write content to a file, creating parent directories as needed
pub fn write_file(path: &Path, content: impl AsRef<[u8]>) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    std::fs::write(path, content).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Read content from a file
pub fn read_file(path: &Path) -> Result<String, FilesystemError> {
    std::fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a single file if it exists
pub fn remove_file(path: &Path) -> Result<(), FilesystemError> {
    if path.exists() {
        std::fs::remove_file(path).map_err(|e| FilesystemError::WriteFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

/// Copy a file, creating parent directories of the destination
pub fn copy_file(from: &Path, to: &Path) -> Result<(), FilesystemError> {
    if let Some(parent) = to.parent() {
        create_dir_all(parent)?;
    }
    std::fs::copy(from, to).map(|_| ()).map_err(|e| FilesystemError::WriteFile {
        path: to.to_path_buf(),
        error: e.to_string(),
    })
}

/// Rename a path, retried like the other directory operations
pub fn rename(from: &Path, to: &Path) -> Result<(), FilesystemError> {
    retry(|| std::fs::rename(from, to)).map_err(|e| FilesystemError::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        error: e.to_string(),
    })
}

/// Create a directory symlink from `link` to `target`.
///
/// On Windows this creates a junction-style directory link so that no
/// elevated privileges are required.
pub fn symlink_dir(target: &Path, link: &Path) -> Result<(), FilesystemError> {
    if let Some(parent) = link.parent() {
        create_dir_all(parent)?;
    }
    if link.exists() || std::fs::symlink_metadata(link).is_ok() {
        // Replace a stale link in place
        let _ = std::fs::remove_file(link);
        let _ = std::fs::remove_dir_all(link);
    }

    #[cfg(unix)]
    let result = std::os::unix::fs::symlink(target, link);
    #[cfg(windows)]
    let result = std::os::windows::fs::symlink_dir(target, link);

    result.map_err(|e| FilesystemError::WriteFile {
        path: link.to_path_buf(),
        error: e.to_string(),
    })
}

/// Last-modified time of a path, if it exists
pub fn mtime(path: &Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Touch a marker file with fresh content so its mtime advances
pub fn touch_marker(path: &Path) -> Result<(), FilesystemError> {
    let stamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    write_file(path, format!("{stamp}\n"))
}

fn retry<T>(mut op: impl FnMut() -> std::io::Result<T>) -> std::io::Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < MAX_FS_RETRIES => {
                attempt += 1;
                tracing::debug!("Filesystem operation failed (attempt {attempt}): {e}");
                std::thread::sleep(Duration::from_millis(100 * u64::from(attempt)));
            }
            Err(e) => return Err(e),
        }
    }
}
