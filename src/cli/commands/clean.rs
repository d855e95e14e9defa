//! CLI implementation for `bundlerig clean` command
//!
//! Removes the generated `.bundlerig/` output directory.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::cli::output::{is_json, print_success};
use crate::config::defaults;
use crate::core::clean::clean_project;

/// Execute the clean command
pub async fn execute(path: &Path) -> Result<()> {
    if !path.join(defaults::MANIFEST_FILE).exists() {
        bail!(
            "No {} found in {}",
            defaults::MANIFEST_FILE,
            path.display()
        );
    }

    let result = clean_project(path).context("Failed to clean generated output")?;

    if is_json() {
        let json = serde_json::json!({
            "removed": result.removed,
            "files": result.files,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else if result.removed {
        print_success(&format!(
            "Removed {}/ ({} files)",
            defaults::BASE_DIR,
            result.files
        ));
    } else {
        print_success("Nothing to clean");
    }

    Ok(())
}
