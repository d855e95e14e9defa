//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

use assert_fs::prelude::*;
use assert_fs::TempDir;
use std::path::Path;
use std::process::{Command, Output};

/// Test project context
///
/// Creates a temporary project directory and runs the `bundlerig` binary
/// inside it.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TestProject {
    /// Create an empty test project
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Create a test project with a manifest
    pub fn with_manifest(manifest: &str) -> Self {
        let project = Self::new();
        project.create_file("bundlerig.toml", manifest);
        project
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        self.dir
            .child(name)
            .write_str(content)
            .expect("Failed to write file");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Run bundlerig with arguments in the project directory
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_bundlerig"))
            .current_dir(self.path())
            .args(args)
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to execute bundlerig")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Stdout of a command run as a string
#[allow(dead_code)]
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Stderr of a command run as a string
#[allow(dead_code)]
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Manifest whose bundler writes a marker file per target
///
/// `build_command` records the target name, mode, and defines into
/// `.bundlerig/log/<target>.txt`.
#[allow(dead_code)]
pub const SCRIPTED_MANIFEST: &str = r#"
[project]
name = "desktop-client"

[bundler]
build_command = 'mkdir -p .bundlerig/log && printf "%s\n%s\n" "$BUNDLERIG_MODE" "$BUNDLERIG_DEFINE" > ".bundlerig/log/$BUNDLERIG_TARGET.txt"'
serve_command = "true"

[[build]]
entry = "src/main.js"

[[build]]
entry = "src/preload.js"

[[renderer]]
name = "main_window"
"#;

/// Manifest without bundler commands
#[allow(dead_code)]
pub const PLAIN_MANIFEST: &str = r#"
[project]
name = "desktop-client"

[[build]]
entry = "src/main.js"

[[renderer]]
name = "main_window"
"#;
