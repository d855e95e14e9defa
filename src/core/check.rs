//! Check command logic
//!
//! Validates the manifest, verifies that the bundler programs are on
//! `PATH`, and reports which targets would be built, without building.

use std::path::Path;

use crate::core::manifest::Manifest;

/// Result of the check operation
#[derive(Debug, Default)]
pub struct CheckResult {
    /// Manifest validation problems
    pub problems: Vec<String>,
    /// Non-fatal findings
    pub warnings: Vec<String>,
    /// Non-UI targets, by entry
    pub build_targets: Vec<String>,
    /// Renderer targets, by name
    pub renderer_targets: Vec<String>,
    /// Bundler programs and whether each was found on `PATH`
    pub programs: Vec<(String, bool)>,
}

impl CheckResult {
    /// Whether the project can be started and packaged
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty() && self.programs.iter().all(|(_, found)| *found)
    }
}

/// Check a project without building it
pub fn check(project_dir: &Path, manifest: &Manifest) -> CheckResult {
    let mut result = CheckResult {
        problems: manifest.problems().iter().map(ToString::to_string).collect(),
        build_targets: manifest.build.iter().map(|b| b.entry.clone()).collect(),
        renderer_targets: manifest.renderer.iter().map(|r| r.name.clone()).collect(),
        ..CheckResult::default()
    };

    let commands = [
        ("build_command", manifest.bundler.build_command.as_deref()),
        ("serve_command", manifest.bundler.serve_command.as_deref()),
    ];
    for (field, command) in commands {
        match command.and_then(program_of) {
            Some(program) => {
                let found = which::which(program).is_ok();
                result.programs.push((program.to_string(), found));
            }
            None => result
                .warnings
                .push(format!("No bundler.{field} configured")),
        }
    }

    for build in &manifest.build {
        if !build.entry.is_empty() && !project_dir.join(&build.entry).exists() {
            result
                .warnings
                .push(format!("Entry '{}' does not exist", build.entry));
        }
    }

    let config_files = manifest
        .build
        .iter()
        .filter_map(|b| b.config.as_deref())
        .chain(manifest.renderer.iter().filter_map(|r| r.config.as_deref()));
    for config in config_files {
        if !project_dir.join(config).exists() {
            result
                .warnings
                .push(format!("Bundler config '{config}' does not exist"));
        }
    }

    result
}

/// First word of a shell command, skipping leading `VAR=value` assignments
fn program_of(command: &str) -> Option<&str> {
    command
        .split_whitespace()
        .find(|word| !word.contains('='))
}
