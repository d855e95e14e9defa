//! CLI implementation for `bundlerig targets`
//!
//! Prints the build configuration generated for every target.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::commands::load_manifest;
use crate::cli::output::{is_json, print_detail, print_info};
use crate::core::config_gen::{BuildConfig, ConfigGenerator};

/// Execute the targets command
pub async fn execute(project_dir: &Path, production: bool) -> Result<()> {
    let manifest = load_manifest(project_dir)?;
    let mut generator = ConfigGenerator::new(project_dir, manifest, production);

    let mut configs = generator
        .build_configs(false)
        .context("Failed to generate build configs")?;
    configs.extend_from_slice(generator.renderer_configs()?);

    if is_json() {
        println!("{}", serde_json::to_string_pretty(&configs)?);
        return Ok(());
    }

    print_info(&format!(
        "{} targets ({} mode)",
        configs.len(),
        if production { "production" } else { "development" }
    ));
    for config in &configs {
        print_target(project_dir, config);
    }
    Ok(())
}

fn print_target(project_dir: &Path, config: &BuildConfig) {
    println!();
    println!("{} [{}]", config.name, config.kind.as_str());
    if let Some(entry) = &config.entry {
        print_detail(&format!("Entry:  {}", relative(project_dir, entry)));
    }
    if let Some(config_file) = &config.config_file {
        print_detail(&format!("Config: {}", relative(project_dir, config_file)));
    }
    print_detail(&format!("Output: {}", relative(project_dir, &config.out_dir)));
    for (key, value) in &config.define {
        print_detail(&format!("{key} = {value}"));
    }
}

fn relative(base: &Path, path: &Path) -> String {
    path.strip_prefix(base).unwrap_or(path).display().to_string()
}
