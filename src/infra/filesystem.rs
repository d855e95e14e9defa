//! Filesystem operations
//!
//! Thin wrappers mapping `std::io` failures to [`FilesystemError`].

use std::path::Path;

use crate::error::FilesystemError;

/// Remove a directory and all its contents; a missing directory is fine
pub fn remove_dir_all(path: &Path) -> Result<(), FilesystemError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FilesystemError::RemoveDir {
            path: path.to_path_buf(),
            error: e.to_string(),
        }),
    }
}
