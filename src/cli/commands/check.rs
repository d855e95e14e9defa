//! Check command implementation
//!
//! Implements `bundlerig check` to validate a project without building.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::cli::output::{is_json, is_quiet, print_detail, print_info, print_success, print_warning, status};
use crate::config::defaults;
use crate::core::check;
use crate::core::manifest::Manifest;

/// Execute the check command
pub async fn execute(project_dir: &Path) -> Result<()> {
    let manifest_path = project_dir.join(defaults::MANIFEST_FILE);
    let manifest = Manifest::load(&manifest_path)
        .with_context(|| format!("Failed to load {}", manifest_path.display()))?;

    tracing::info!("Checking project: {}", manifest.project.name);
    let result = check::check(project_dir, &manifest);

    if is_json() {
        let json = serde_json::json!({
            "status": if result.is_valid() { "success" } else { "error" },
            "problems": result.problems,
            "warnings": result.warnings,
            "build_targets": result.build_targets,
            "renderer_targets": result.renderer_targets,
            "programs": result.programs.iter().map(|(program, found)| serde_json::json!({
                "program": program,
                "found": found,
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else if is_quiet() {
        for problem in &result.problems {
            eprintln!("{} {problem}", status::ERROR);
        }
    } else {
        print_report(&result);
    }

    if !result.is_valid() {
        bail!("Project check failed");
    }
    Ok(())
}

fn print_report(result: &check::CheckResult) {
    print_info("Checking project configuration...");
    println!();

    if result.problems.is_empty() {
        print_success("Manifest is valid");
    } else {
        println!("{} Manifest has errors", status::ERROR);
        for problem in &result.problems {
            print_detail(&format!("- {problem}"));
        }
    }

    for (program, found) in &result.programs {
        if *found {
            print_success(&format!("'{program}' found on PATH"));
        } else {
            println!("{} '{program}' not found on PATH", status::ERROR);
        }
    }

    if !result.warnings.is_empty() {
        println!();
        for warning in &result.warnings {
            print_warning(warning);
        }
    }

    println!();
    println!("Build targets:");
    list_or_none(&result.build_targets);
    println!("Renderer targets:");
    list_or_none(&result.renderer_targets);
}

fn list_or_none(items: &[String]) {
    if items.is_empty() {
        print_detail("(none)");
    }
    for item in items {
        print_detail(&format!("• {item}"));
    }
}
