//! CLI implementation for `bundlerig start`
//!
//! Brings up a dev server per renderer target and watching builds for the
//! non-UI targets, then launches the application.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use crate::cli::commands::{load_manifest, orchestrator};
use crate::cli::output::{create_spinner, print_info, print_success, status};
use crate::core::orchestrator::{ChildExit, Orchestrator};

/// Execute the start command
pub async fn execute(project_dir: &Path) -> Result<()> {
    let manifest = load_manifest(project_dir)?;
    let launch = manifest.launch.clone();
    let mut orch = orchestrator(project_dir, manifest)?;
    orch.init();

    let Some(plan) = orch.start_logic()? else {
        tracing::debug!("Dev environment already started");
        return Ok(());
    };

    for task in plan.tasks {
        let spinner = create_spinner(task.title());
        let started = Instant::now();

        if let Err(e) = orch.run_start_task(task).await {
            spinner.finish_with_message(format!("{} {}", status::ERROR, task.title()));
            orch.shutdown().await;
            return Err(e).context("Failed to start the dev environment");
        }

        let message = format!(
            "{} {} ({:.1}s)",
            status::SUCCESS,
            task.title(),
            started.elapsed().as_secs_f64()
        );
        if task.persistent_output() {
            spinner.finish_with_message(message);
        } else {
            spinner.finish_and_clear();
        }
    }
    orch.lifecycle().mark_running();
    print_success("Dev environment is up");

    match launch {
        Some(launch) if !plan.blocking => launch_app(project_dir, &launch.command, &orch).await,
        _ => {
            print_info("Press Ctrl+C to stop");
            // The interrupt hook tears down and exits.
            std::future::pending::<()>().await;
            Ok(())
        }
    }
}

/// Run the application and tear down once it exits
async fn launch_app(project_dir: &Path, command: &str, orch: &Orchestrator) -> Result<()> {
    tracing::info!("Launching application: {command}");

    let mut child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(project_dir)
        .stdin(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to launch '{command}'"))?;

    let exited = async move {
        let code = match child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                tracing::error!("Failed waiting for the application: {e}");
                None
            }
        };
        ChildExit {
            restarted: false,
            code,
        }
    };

    orch.post_start(exited)
        .await
        .context("Application exit handler failed")?;
    Ok(())
}
