//! Infrastructure layer
//!
//! Handles all I/O operations: external bundler processes, HTTP readiness
//! probes, and the filesystem.

pub mod filesystem;
pub mod probe;
pub mod process;
