//! CLI implementation for `bundlerig package`
//!
//! Compiles every target in production mode.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Instant;

use crate::cli::commands::{load_manifest, orchestrator};
use crate::cli::output::{create_spinner, print_detail, print_success, status};

/// Execute the package command
pub async fn execute(project_dir: &Path) -> Result<()> {
    let manifest = load_manifest(project_dir)?;
    let mut orch = orchestrator(project_dir, manifest)?;

    let spinner = create_spinner("Compiling targets for production");
    let started = Instant::now();
    let result = orch.pre_package().await;
    orch.shutdown().await;

    if let Err(e) = result {
        spinner.finish_with_message(format!("{} Production build failed", status::ERROR));
        return Err(e).context("Failed to compile for production");
    }
    spinner.finish_and_clear();

    print_success(&format!(
        "Compiled for production in {:.1}s",
        started.elapsed().as_secs_f64()
    ));
    print_detail(&format!(
        "Output: {}",
        orch.generator().base_dir().display()
    ));
    Ok(())
}
