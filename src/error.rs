//! Error types for bundlerig
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Manifest and build configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Manifest file not found
    #[error("Manifest not found at '{path}'. Create a bundlerig.toml to describe your targets.")]
    ManifestNotFound { path: PathBuf },

    /// IO error while reading the manifest
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },

    /// Manifest parse error
    #[error("Failed to parse manifest: {0}")]
    ParseError(String),

    /// Missing required field
    #[error("Manifest is missing required field '{field}'")]
    MissingField { field: String },

    /// Invalid field value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Renderer name cannot be turned into a constant identifier
    #[error("Renderer name '{name}' must contain at least one letter or digit")]
    InvalidRendererName { name: String },

    /// Renderer name would leave the renderer output directory
    #[error("Renderer name '{name}' must not contain path separators")]
    UnsafeRendererName { name: String },

    /// Two renderer targets share a name
    #[error("Renderer name '{name}' is declared more than once")]
    DuplicateRenderer { name: String },

    /// Two renderer names map to the same constant prefix
    #[error("Renderers '{first}' and '{second}' both define {prefix}_* constants")]
    ConstantCollision {
        first: String,
        second: String,
        prefix: String,
    },

    /// Nothing to build
    #[error("Manifest declares no [[build]] or [[renderer]] targets")]
    NoTargets,
}

/// Errors raised by the bundler seam
#[derive(Error, Debug)]
pub enum BundlerError {
    /// No command configured for the requested operation
    #[error("No {kind} command configured in [bundler]")]
    MissingCommand { kind: String },

    /// Failed to spawn a bundler process
    #[error("Failed to spawn '{command}': {error}")]
    Spawn { command: String, error: String },

    /// Bundler process exited unsuccessfully
    #[error("'{command}' exited with {status}")]
    Exited { command: String, status: String },

    /// Dev server never reported a URL
    #[error("Dev server '{command}' did not report a URL within {timeout_ms}ms")]
    NoUrlReported { command: String, timeout_ms: u64 },

    /// Dev server URL never answered
    #[error("Dev server at {url} is not responding: {error}")]
    NotReady { url: String, error: String },

    /// Failed to close a handle
    #[error("Failed to close {what}: {error}")]
    Close { what: String, error: String },

    /// Generic bundler failure
    #[error("{0}")]
    Other(String),
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },
}

/// Orchestration errors surfaced to the packaging and start flows
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Config generation failed
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A build target failed to compile
    #[error("Failed to compile target '{target}': {source}")]
    Compile {
        target: String,
        #[source]
        source: BundlerError,
    },

    /// A renderer dev server failed to start
    #[error("Failed to start dev server for renderer '{target}': {source}")]
    ServerStart {
        target: String,
        #[source]
        source: BundlerError,
    },

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),

    /// A spawned compile task panicked or was aborted
    #[error("Compile task for '{target}' did not finish: {error}")]
    TaskFailed { target: String, error: String },
}

impl OrchestratorError {
    /// Name of the target the error belongs to, if any
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Compile { target, .. }
            | Self::ServerStart { target, .. }
            | Self::TaskFailed { target, .. } => Some(target),
            Self::Config(_) | Self::Filesystem(_) => None,
        }
    }
}
