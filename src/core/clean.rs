//! Clean logic
//!
//! Removes the generated output directory (`.bundlerig/`) holding compiled
//! targets and renderer bundles.

use std::path::Path;
use walkdir::WalkDir;

use crate::config::defaults;
use crate::error::FilesystemError;
use crate::infra::filesystem;

/// Result of clean operation
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanResult {
    /// Whether the output directory existed and was removed
    pub removed: bool,
    /// Number of files that were removed
    pub files: usize,
}

/// Remove the generated output of a project
pub fn clean_project(project_path: &Path) -> Result<CleanResult, FilesystemError> {
    let base = project_path.join(defaults::BASE_DIR);
    if !base.exists() {
        return Ok(CleanResult::default());
    }

    let files = count_files(&base);
    filesystem::remove_dir_all(&base)?;
    tracing::debug!("Removed {} ({files} files)", base.display());

    Ok(CleanResult {
        removed: true,
        files,
    })
}

fn count_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count()
}
