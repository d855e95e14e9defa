//! Build configuration generation
//!
//! Turns the manifest's declared targets into [`BuildConfig`] values for
//! the bundler. Renderer configs are generated once and cached so that the
//! dev server port written back into them is seen by every later non-UI
//! config, which embeds the renderer URL as a compile-time constant.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::manifest::Manifest;
use crate::error::ConfigError;

/// Which side of the application a target belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Main process, preload script, worker
    Main,
    /// UI bundle served by a dev server
    Renderer,
}

impl TargetKind {
    /// Lowercase name used in logs and environment variables
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Renderer => "renderer",
        }
    }
}

/// Production or development compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Production,
    Development,
}

impl BuildMode {
    /// Lowercase name passed to the bundler
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }
}

/// Dev server settings of a renderer config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerOptions {
    /// Host the server binds to
    pub host: String,
    /// Bound port; `None` until the dev server has been started
    pub port: Option<u16>,
}

/// Configuration of one bundler invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Target name (entry file stem or renderer name)
    pub name: String,
    /// Target kind
    pub kind: TargetKind,
    /// Project root
    pub root: PathBuf,
    /// Entry point for non-UI targets
    pub entry: Option<PathBuf>,
    /// Bundler config file
    pub config_file: Option<PathBuf>,
    /// Output directory
    pub out_dir: PathBuf,
    /// Compilation mode
    pub mode: BuildMode,
    /// Keep rebuilding on file changes
    pub watch: bool,
    /// Compile-time constants, values are source literals
    pub define: BTreeMap<String, String>,
    /// Dev server settings
    pub server: ServerOptions,
}

/// Compile-time constant prefix for a renderer name
///
/// `main_window` becomes `MAIN_WINDOW`; any character other than an ASCII
/// letter or digit becomes an underscore.
pub fn constant_prefix(name: &str) -> Result<String, ConfigError> {
    if !name.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(ConfigError::InvalidRendererName {
            name: name.to_string(),
        });
    }

    Ok(name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect())
}

/// Reject renderer names that would escape the renderer output directory
pub fn check_renderer_name(name: &str) -> Result<(), ConfigError> {
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(ConfigError::UnsafeRendererName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Name of the constant carrying a renderer's dev server URL
pub fn dev_server_url_constant(name: &str) -> Result<String, ConfigError> {
    Ok(format!("{}_DEV_SERVER_URL", constant_prefix(name)?))
}

/// Name of the constant carrying a renderer's name
pub fn name_constant(name: &str) -> Result<String, ConfigError> {
    Ok(format!("{}_NAME", constant_prefix(name)?))
}

/// Produces build configurations for the declared targets
#[derive(Debug)]
pub struct ConfigGenerator {
    root: PathBuf,
    manifest: Manifest,
    is_prod: bool,
    renderer_cache: Option<Vec<BuildConfig>>,
}

impl ConfigGenerator {
    /// Create a generator for the project at `root`
    pub fn new(root: impl Into<PathBuf>, manifest: Manifest, is_prod: bool) -> Self {
        Self {
            root: root.into(),
            manifest,
            is_prod,
            renderer_cache: None,
        }
    }

    /// Switch between production and development, dropping cached configs
    pub fn set_prod(&mut self, is_prod: bool) {
        if self.is_prod != is_prod {
            self.is_prod = is_prod;
            self.renderer_cache = None;
        }
    }

    /// Directory holding all generated output
    pub fn base_dir(&self) -> PathBuf {
        self.root.join(defaults::BASE_DIR)
    }

    fn mode(&self) -> BuildMode {
        if self.is_prod {
            BuildMode::Production
        } else {
            BuildMode::Development
        }
    }

    /// Renderer configs in declaration order
    ///
    /// Generated on first call; later calls return the same configs,
    /// including any `server.port` written into them.
    pub fn renderer_configs(&mut self) -> Result<&mut [BuildConfig], ConfigError> {
        if self.renderer_cache.is_none() {
            let configs = self.generate_renderer_configs()?;
            self.renderer_cache = Some(configs);
        }

        Ok(self.renderer_cache.as_deref_mut().unwrap_or_default())
    }

    fn generate_renderer_configs(&self) -> Result<Vec<BuildConfig>, ConfigError> {
        let renderer_dir = self.base_dir().join(defaults::RENDERER_SUBDIR);

        self.manifest
            .renderer
            .iter()
            .map(|renderer| {
                // Reject names that cannot become constants or directories before anything is built.
                check_renderer_name(&renderer.name)?;
                constant_prefix(&renderer.name)?;

                Ok(BuildConfig {
                    name: renderer.name.clone(),
                    kind: TargetKind::Renderer,
                    root: self.root.clone(),
                    entry: None,
                    config_file: renderer.config.as_ref().map(|c| self.root.join(c)),
                    out_dir: renderer_dir.join(&renderer.name),
                    mode: self.mode(),
                    watch: false,
                    define: BTreeMap::new(),
                    server: ServerOptions {
                        host: defaults::DEFAULT_DEV_HOST.to_string(),
                        port: renderer.port,
                    },
                })
            })
            .collect()
    }

    /// Compile-time constants describing every renderer target
    pub fn defines(&mut self) -> Result<BTreeMap<String, String>, ConfigError> {
        let is_prod = self.is_prod;
        let mut define = BTreeMap::new();

        for renderer in self.renderer_configs()?.iter() {
            let url = if is_prod {
                "undefined".to_string()
            } else {
                let port = renderer.server.port.unwrap_or(defaults::DEFAULT_DEV_PORT);
                json_string(&format!("http://{}:{port}", renderer.server.host))
            };

            define.insert(dev_server_url_constant(&renderer.name)?, url);
            define.insert(name_constant(&renderer.name)?, json_string(&renderer.name));
        }

        Ok(define)
    }

    /// Non-UI build configs in declaration order
    pub fn build_configs(&mut self, watch: bool) -> Result<Vec<BuildConfig>, ConfigError> {
        let define = self.defines()?;
        let out_dir = self.base_dir().join(defaults::BUILD_SUBDIR);

        let configs = self
            .manifest
            .build
            .iter()
            .map(|entry| BuildConfig {
                name: target_name(&entry.entry),
                kind: TargetKind::Main,
                root: self.root.clone(),
                entry: Some(self.root.join(&entry.entry)),
                config_file: entry.config.as_ref().map(|c| self.root.join(c)),
                out_dir: out_dir.clone(),
                mode: self.mode(),
                watch,
                define: define.clone(),
                server: ServerOptions {
                    host: defaults::DEFAULT_DEV_HOST.to_string(),
                    port: None,
                },
            })
            .collect();

        Ok(configs)
    }
}

/// Target name for a non-UI entry: its file stem
fn target_name(entry: &str) -> String {
    Path::new(entry)
        .file_stem()
        .map_or_else(|| entry.to_string(), |s| s.to_string_lossy().into_owned())
}

fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
