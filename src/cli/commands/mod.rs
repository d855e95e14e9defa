//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod check;
pub mod clean;
pub mod package;
pub mod start;
pub mod targets;

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::Path;
use std::sync::Arc;

use crate::config::defaults;
use crate::core::manifest::Manifest;
use crate::core::orchestrator::Orchestrator;
use crate::infra::process::CommandBundler;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start dev servers and watch builds, then launch the app
    Start,

    /// Compile every target for production
    Package,

    /// Compile the non-UI targets
    Build {
        /// Keep rebuilding on file changes until interrupted
        #[arg(short, long)]
        watch: bool,
    },

    /// Show the generated build configuration of every target
    Targets {
        /// Show the production configuration
        #[arg(long)]
        production: bool,
    },

    /// Validate the project without building
    Check,

    /// Remove generated output
    Clean,
}

impl Commands {
    /// Run the command in the current directory
    pub async fn run(self) -> Result<()> {
        let current_dir = std::env::current_dir()?;
        match self {
            Self::Start => start::execute(&current_dir).await,
            Self::Package => package::execute(&current_dir).await,
            Self::Build { watch } => build::execute(&current_dir, watch).await,
            Self::Targets { production } => targets::execute(&current_dir, production).await,
            Self::Check => check::execute(&current_dir).await,
            Self::Clean => clean::execute(&current_dir).await,
        }
    }
}

/// Load and validate the project manifest
pub(crate) fn load_manifest(project_dir: &Path) -> Result<Manifest> {
    let manifest_path = project_dir.join(defaults::MANIFEST_FILE);
    let manifest = Manifest::load(&manifest_path)
        .with_context(|| format!("Failed to load {}", manifest_path.display()))?;
    manifest
        .validate()
        .with_context(|| format!("Invalid {}", defaults::MANIFEST_FILE))?;

    tracing::info!("Loaded project: {}", manifest.project.name);
    Ok(manifest)
}

/// Create an orchestrator driving the manifest's bundler commands
pub(crate) fn orchestrator(project_dir: &Path, manifest: Manifest) -> Result<Orchestrator> {
    let bundler = CommandBundler::from_config(&manifest.bundler)
        .context("Invalid [bundler] configuration")?;
    Ok(Orchestrator::from_manifest(
        project_dir,
        manifest,
        Arc::new(bundler),
    ))
}
