//! The seam between the orchestrator and the external bundler
//!
//! The bundler itself is opaque: it compiles a [`BuildConfig`] and serves
//! renderer assets. The orchestrator only needs to know whether a build
//! keeps running after its first pass, and which port a dev server bound.

use futures::future::BoxFuture;
use std::net::SocketAddr;
use tokio::sync::oneshot;

use crate::core::config_gen::BuildConfig;
use crate::error::BundlerError;

/// Result of asking the bundler to compile one target
pub enum BuildOutcome {
    /// The build finished and holds no resources
    OneShot,
    /// The build keeps watching files until the handle is closed
    Watching(Box<dyn WatchHandle>),
}

impl std::fmt::Debug for BuildOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneShot => f.write_str("OneShot"),
            Self::Watching(_) => f.write_str("Watching(..)"),
        }
    }
}

/// An ongoing, file-triggered recompilation
pub trait WatchHandle: Send {
    /// Stop watching and release the underlying resources
    fn close(&mut self) -> BoxFuture<'_, Result<(), BundlerError>>;
}

/// A live HTTP server serving renderer assets
pub trait DevServer: Send {
    /// Start accepting connections
    fn listen(&mut self) -> BoxFuture<'_, Result<(), BundlerError>>;

    /// Report the server URLs to the operator
    fn print_urls(&self);

    /// Address the server is bound to, once listening
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Stop the server
    fn close(&mut self) -> BoxFuture<'_, Result<(), BundlerError>>;
}

/// Signal fired by the bundler when a build first closes its bundle
///
/// For a watching build this happens after the first successful
/// emission, long before the build itself ends. A watching build whose
/// first pass fails reports the failure through [`BundleClosed::fail`].
#[derive(Debug)]
pub struct BundleClosed(oneshot::Sender<Result<(), BundlerError>>);

/// Receiver side of [`BundleClosed`]
pub type FirstPass = oneshot::Receiver<Result<(), BundlerError>>;

impl BundleClosed {
    /// Create a signal and the receiver that observes it
    pub fn channel() -> (Self, FirstPass) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    /// Mark the bundle as closed
    pub fn signal(self) {
        // The receiver may already be gone if the aggregate call failed.
        let _ = self.0.send(Ok(()));
    }

    /// Report that the first pass failed
    pub fn fail(self, error: BundlerError) {
        let _ = self.0.send(Err(error));
    }
}

/// The external bundling capability
pub trait Bundler: Send + Sync {
    /// Compile one target
    ///
    /// Implementations call [`BundleClosed::signal`] once the first bundle
    /// has been written. One-shot builds may simply return; a dropped
    /// signal after a successful return counts as closed. Watching builds
    /// return their handle as soon as the process runs, so that teardown
    /// can reach it during the first pass.
    fn build<'a>(
        &'a self,
        config: &'a BuildConfig,
        closed: BundleClosed,
    ) -> BoxFuture<'a, Result<BuildOutcome, BundlerError>>;

    /// Create a dev server for a renderer target, not yet listening
    fn create_server<'a>(
        &'a self,
        config: &'a BuildConfig,
    ) -> BoxFuture<'a, Result<Box<dyn DevServer>, BundlerError>>;
}
