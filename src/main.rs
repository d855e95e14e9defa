//! Bundlerig CLI
//!
//! Entry point for the bundlerig command-line application.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bundlerig::cli::output::{display_error, OutputConfig};
use bundlerig::cli::{git_sha, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Apply output configuration globally
    let output_config = OutputConfig::new(cli.quiet, cli.json, cli.verbose);
    output_config.apply_global();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(output_config.log_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!("bundlerig {} ({})", env!("CARGO_PKG_VERSION"), git_sha().unwrap_or("unknown"));

    // Run the command and handle errors
    match cli.run().await {
        Ok(()) => Ok(()),
        Err(e) => {
            display_error(&e);
            std::process::exit(1);
        }
    }
}
