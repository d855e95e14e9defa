//! Manifest (bundlerig.toml) parsing and validation
//!
//! The manifest declares the bundler commands, the non-UI build targets,
//! and the renderer targets of a project.
//! Supports environment variable substitution using ${VAR} syntax.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::config::defaults;
use crate::core::config_gen;
use crate::error::ConfigError;

/// The main project manifest (bundlerig.toml)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Project configuration
    pub project: ProjectConfig,

    /// Bundler commands
    #[serde(default)]
    pub bundler: BundlerConfig,

    /// Non-UI build targets (main process, preload scripts, workers)
    #[serde(default)]
    pub build: Vec<BuildEntry>,

    /// UI (renderer) targets
    #[serde(default)]
    pub renderer: Vec<RendererEntry>,

    /// Application launched after `start` brings the dev environment up
    #[serde(default)]
    pub launch: Option<LaunchConfig>,

    /// Teardown settings
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,

    /// Project description
    #[serde(default)]
    pub description: Option<String>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// Commands used to drive the external bundler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundlerConfig {
    /// Command compiling one target (run through the shell)
    #[serde(default)]
    pub build_command: Option<String>,

    /// Command starting a renderer dev server (run through the shell)
    #[serde(default)]
    pub serve_command: Option<String>,

    /// Output line marking the end of a watch build's first pass
    #[serde(default = "default_ready_pattern")]
    pub ready_pattern: String,

    /// Output line carrying the dev server URL; group 1 is the port
    #[serde(default = "default_url_pattern")]
    pub url_pattern: String,

    /// How long a dev server may take to report its URL
    #[serde(default = "default_listen_timeout")]
    pub listen_timeout_ms: u64,

    /// Probe the dev server URL over HTTP before reporting it as listening
    #[serde(default = "default_true")]
    pub probe: bool,
}

fn default_ready_pattern() -> String {
    defaults::DEFAULT_READY_PATTERN.to_string()
}

fn default_url_pattern() -> String {
    defaults::DEFAULT_URL_PATTERN.to_string()
}

fn default_listen_timeout() -> u64 {
    defaults::LISTEN_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            build_command: None,
            serve_command: None,
            ready_pattern: default_ready_pattern(),
            url_pattern: default_url_pattern(),
            listen_timeout_ms: default_listen_timeout(),
            probe: true,
        }
    }
}

/// A non-UI build target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildEntry {
    /// Entry point, relative to the project root
    pub entry: String,

    /// Bundler config file for this target
    #[serde(default)]
    pub config: Option<String>,
}

/// A renderer (UI) target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RendererEntry {
    /// Renderer name, also the prefix of its compile-time constants
    pub name: String,

    /// Bundler config file for this renderer
    #[serde(default)]
    pub config: Option<String>,

    /// Fixed dev server port; an OS-assigned port is used when absent
    #[serde(default)]
    pub port: Option<u16>,
}

/// Application launch configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LaunchConfig {
    /// Command run through the shell once the dev environment is up
    pub command: String,
}

/// Teardown settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShutdownConfig {
    /// Upper bound for closing a single watcher or dev server
    #[serde(default = "default_close_timeout")]
    pub close_timeout_ms: u64,
}

fn default_close_timeout() -> u64 {
    defaults::CLOSE_TIMEOUT_MS
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            close_timeout_ms: default_close_timeout(),
        }
    }
}

/// Substitute environment variables in a string using ${VAR} syntax.
///
/// Unset variables are replaced with an empty string.
///
/// # Examples
/// ```
/// use bundlerig::core::manifest::substitute_env_vars;
///
/// std::env::set_var("BUNDLERIG_DOC_VAR", "hello");
/// let result = substitute_env_vars("prefix_${BUNDLERIG_DOC_VAR}_suffix");
/// assert_eq!(result, "prefix_hello_suffix");
/// std::env::remove_var("BUNDLERIG_DOC_VAR");
/// ```
pub fn substitute_env_vars(input: &str) -> String {
    let Ok(re) = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}") else {
        return input.to_string();
    };

    re.replace_all(input, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}

/// Recursively substitute environment variables in a TOML value
fn substitute_in_value(value: &mut toml::Value) {
    match value {
        toml::Value::String(s) => {
            *s = substitute_env_vars(s);
        }
        toml::Value::Array(arr) => {
            for item in arr.iter_mut() {
                substitute_in_value(item);
            }
        }
        toml::Value::Table(table) => {
            for (_, v) in table.iter_mut() {
                substitute_in_value(v);
            }
        }
        _ => {}
    }
}

impl Manifest {
    /// Load a manifest from file path, substituting ${VAR} patterns
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ManifestNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let mut value: toml::Value =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        substitute_in_value(&mut value);

        let manifest: Self = value
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))?;

        tracing::debug!(
            "Loaded manifest for '{}' ({} build, {} renderer targets)",
            manifest.project.name,
            manifest.build.len(),
            manifest.renderer.len()
        );
        Ok(manifest)
    }

    /// Load manifest from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize manifest to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Validate the manifest, failing on the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.problems().into_iter().next() {
            Some(problem) => Err(problem),
            None => Ok(()),
        }
    }

    /// Collect every validation problem, not just the first one
    pub fn problems(&self) -> Vec<ConfigError> {
        let mut problems = Vec::new();

        if self.project.name.trim().is_empty() {
            problems.push(ConfigError::MissingField {
                field: "project.name".to_string(),
            });
        }

        if self.build.is_empty() && self.renderer.is_empty() {
            problems.push(ConfigError::NoTargets);
        }

        for (index, entry) in self.build.iter().enumerate() {
            if entry.entry.trim().is_empty() {
                problems.push(ConfigError::MissingField {
                    field: format!("build[{index}].entry"),
                });
            }
        }

        let mut names = HashSet::new();
        let mut prefixes: HashMap<String, &str> = HashMap::new();
        for renderer in &self.renderer {
            let prefix = match config_gen::check_renderer_name(&renderer.name)
                .and_then(|()| config_gen::constant_prefix(&renderer.name))
            {
                Ok(prefix) => prefix,
                Err(e) => {
                    problems.push(e);
                    continue;
                }
            };

            if !names.insert(renderer.name.as_str()) {
                problems.push(ConfigError::DuplicateRenderer {
                    name: renderer.name.clone(),
                });
            } else if let Some(first) = prefixes.get(&prefix) {
                problems.push(ConfigError::ConstantCollision {
                    first: first.to_string(),
                    second: renderer.name.clone(),
                    prefix,
                });
            } else {
                prefixes.insert(prefix, &renderer.name);
            }
        }

        for (field, pattern) in [
            ("bundler.ready_pattern", &self.bundler.ready_pattern),
            ("bundler.url_pattern", &self.bundler.url_pattern),
        ] {
            if let Err(e) = Regex::new(pattern) {
                problems.push(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: e.to_string(),
                });
            }
        }

        if self.shutdown.close_timeout_ms == 0 {
            problems.push(ConfigError::InvalidValue {
                field: "shutdown.close_timeout_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        problems
    }
}
