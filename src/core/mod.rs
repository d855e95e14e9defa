//! Core logic
//!
//! Everything between the manifest and the external bundler. Process and
//! network side effects live in [`crate::infra`].
//!
//! # Submodules
//!
//! - [`manifest`] - Manifest (bundlerig.toml) parsing and validation
//! - [`config_gen`] - Per-target build configs and compile-time constants
//! - [`bundler`] - The bundler seam: builds, watchers, dev servers
//! - [`lifecycle`] - Resource tracking, process hooks, teardown
//! - [`orchestrator`] - Production and development flows
//! - [`check`] - Project validation without building
//! - [`clean`] - Removal of generated output

pub mod bundler;
pub mod check;
pub mod clean;
pub mod config_gen;
pub mod lifecycle;
pub mod manifest;
pub mod orchestrator;
