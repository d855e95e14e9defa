//! CLI implementation for `bundlerig build`
//!
//! Compiles the non-UI targets, optionally keeping them watching.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::commands::{load_manifest, orchestrator};
use crate::cli::output::{create_spinner, print_info, print_success, status};

/// Execute the build command
pub async fn execute(project_dir: &Path, watch: bool) -> Result<()> {
    let manifest = load_manifest(project_dir)?;
    let targets = manifest.build.len();
    let mut orch = orchestrator(project_dir, manifest)?;

    let spinner = create_spinner(&format!("Compiling {targets} targets"));
    if let Err(e) = orch.build(watch).await {
        spinner.finish_with_message(format!("{} Compilation failed", status::ERROR));
        orch.shutdown().await;
        return Err(e).context("Failed to compile targets");
    }
    spinner.finish_and_clear();
    print_success(&format!("Compiled {targets} targets"));

    if !watch {
        orch.shutdown().await;
        return Ok(());
    }

    print_info("Watching for changes, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    let report = orch.shutdown().await;
    tracing::debug!("Stopped {} watchers", report.watchers);
    Ok(())
}
