//! Bundlerig - build and dev server orchestration for desktop apps
//!
//! Drives an external bundler for projects made of several compilation
//! targets: a main process, preload scripts, and UI renderers. In
//! development it runs a dev server per renderer and watches the other
//! targets, embedding each renderer's dev server URL into them as a
//! compile-time constant. In production it compiles everything once.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Config generation, orchestration, and lifecycle
//! - [`infra`] - Infrastructure layer (processes, HTTP, filesystem)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
