//! Test utilities
//!
//! In-memory stand-ins for the bundler, its watchers and dev servers, plus
//! proptest generators.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::bundler::{BuildOutcome, BundleClosed, Bundler, DevServer, WatchHandle};
use crate::core::config_gen::BuildConfig;
use crate::error::BundlerError;

/// Shared record of close and drop events
#[derive(Debug, Clone, Default)]
pub struct CloseLog {
    closed: Arc<Mutex<Vec<String>>>,
    dropped: Arc<AtomicUsize>,
}

impl CloseLog {
    /// Names of closed handles, in close order
    pub fn entries(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }

    /// How many times `name` was closed
    pub fn count(&self, name: &str) -> usize {
        self.closed
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }

    /// How many handles were dropped
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    fn record(&self, name: &str) {
        self.closed.lock().unwrap().push(name.to_string());
    }
}

/// How a fake handle behaves when closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseBehavior {
    Succeed,
    Fail,
    Hang,
}

fn close_with(
    behavior: CloseBehavior,
    name: &str,
    log: &CloseLog,
) -> BoxFuture<'static, Result<(), BundlerError>> {
    log.record(name);
    let name = name.to_string();
    async move {
        match behavior {
            CloseBehavior::Succeed => Ok(()),
            CloseBehavior::Fail => Err(BundlerError::Close {
                what: name,
                error: "refused".to_string(),
            }),
            CloseBehavior::Hang => futures::future::pending().await,
        }
    }
    .boxed()
}

/// Watcher that records its close
pub struct FakeWatcher {
    name: String,
    log: CloseLog,
    behavior: CloseBehavior,
}

impl FakeWatcher {
    pub fn boxed(name: &str, log: &CloseLog) -> Box<dyn WatchHandle> {
        Self::with_behavior(name, log, CloseBehavior::Succeed)
    }

    pub fn failing(name: &str, log: &CloseLog) -> Box<dyn WatchHandle> {
        Self::with_behavior(name, log, CloseBehavior::Fail)
    }

    pub fn hanging(name: &str, log: &CloseLog) -> Box<dyn WatchHandle> {
        Self::with_behavior(name, log, CloseBehavior::Hang)
    }

    fn with_behavior(name: &str, log: &CloseLog, behavior: CloseBehavior) -> Box<dyn WatchHandle> {
        Box::new(Self {
            name: name.to_string(),
            log: log.clone(),
            behavior,
        })
    }
}

impl WatchHandle for FakeWatcher {
    fn close(&mut self) -> BoxFuture<'_, Result<(), BundlerError>> {
        close_with(self.behavior, &self.name, &self.log)
    }
}

impl Drop for FakeWatcher {
    fn drop(&mut self) {
        self.log.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Dev server bound to a fixed fake port once listening
pub struct FakeServer {
    name: String,
    port: u16,
    listening: bool,
    log: CloseLog,
    behavior: CloseBehavior,
}

impl FakeServer {
    pub fn boxed(name: &str, port: u16, log: &CloseLog) -> Box<dyn DevServer> {
        Self::with_behavior(name, port, log, CloseBehavior::Succeed)
    }

    pub fn failing(name: &str, port: u16, log: &CloseLog) -> Box<dyn DevServer> {
        Self::with_behavior(name, port, log, CloseBehavior::Fail)
    }

    fn with_behavior(
        name: &str,
        port: u16,
        log: &CloseLog,
        behavior: CloseBehavior,
    ) -> Box<dyn DevServer> {
        Box::new(Self {
            name: name.to_string(),
            port,
            // Handles created directly by tests count as already listening.
            listening: true,
            log: log.clone(),
            behavior,
        })
    }
}

impl DevServer for FakeServer {
    fn listen(&mut self) -> BoxFuture<'_, Result<(), BundlerError>> {
        self.listening = true;
        async { Ok(()) }.boxed()
    }

    fn print_urls(&self) {
        tracing::info!("  {} -> http://localhost:{}/", self.name, self.port);
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listening
            .then(|| SocketAddr::from((Ipv4Addr::LOCALHOST, self.port)))
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), BundlerError>> {
        close_with(self.behavior, &self.name, &self.log)
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.log.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scripted behavior of one build target
#[derive(Debug, Clone)]
pub struct Script {
    /// Time spent before the build call returns
    pub delay: Duration,
    /// What the build call returns
    pub result: ScriptResult,
}

/// Result of a scripted build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptResult {
    OneShot,
    Watch,
    /// Returns a watcher, then reports a failed first pass
    WatchFailing(String),
    Fail(String),
}

impl Script {
    pub fn one_shot() -> Self {
        Self {
            delay: Duration::ZERO,
            result: ScriptResult::OneShot,
        }
    }

    pub fn watch() -> Self {
        Self {
            delay: Duration::ZERO,
            result: ScriptResult::Watch,
        }
    }

    pub fn watch_failing(message: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            result: ScriptResult::WatchFailing(message.to_string()),
        }
    }

    pub fn fail(message: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            result: ScriptResult::Fail(message.to_string()),
        }
    }

    #[must_use]
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// In-memory bundler driven by per-target scripts
///
/// Targets without a script build as one-shot. Dev servers bind ports
/// counting up from 41000 unless the config pins one.
pub struct ScriptedBundler {
    scripts: HashMap<String, Script>,
    failing_servers: Vec<String>,
    next_port: AtomicU16,
    events: Arc<Mutex<Vec<String>>>,
    built: Arc<Mutex<Vec<BuildConfig>>>,
    pub log: CloseLog,
}

impl Default for ScriptedBundler {
    fn default() -> Self {
        Self {
            scripts: HashMap::new(),
            failing_servers: Vec::new(),
            next_port: AtomicU16::new(41000),
            events: Arc::default(),
            built: Arc::default(),
            log: CloseLog::default(),
        }
    }
}

impl ScriptedBundler {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn script(mut self, target: &str, script: Script) -> Self {
        self.scripts.insert(target.to_string(), script);
        self
    }

    #[must_use]
    pub fn failing_server(mut self, target: &str) -> Self {
        self.failing_servers.push(target.to_string());
        self
    }

    /// Everything the bundler was asked to do, in order
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Configs handed to `build`, in call order
    pub fn built(&self) -> Vec<BuildConfig> {
        self.built.lock().unwrap().clone()
    }

    fn event(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl Bundler for ScriptedBundler {
    fn build<'a>(
        &'a self,
        config: &'a BuildConfig,
        closed: BundleClosed,
    ) -> BoxFuture<'a, Result<BuildOutcome, BundlerError>> {
        let script = self
            .scripts
            .get(&config.name)
            .cloned()
            .unwrap_or_else(Script::one_shot);

        async move {
            self.event(format!("build:{}", config.name));
            self.built.lock().unwrap().push(config.clone());
            tokio::time::sleep(script.delay).await;

            let outcome = match script.result {
                ScriptResult::OneShot => BuildOutcome::OneShot,
                ScriptResult::Watch => {
                    BuildOutcome::Watching(FakeWatcher::boxed(&config.name, &self.log))
                }
                ScriptResult::WatchFailing(message) => {
                    self.event(format!("failed:{}", config.name));
                    closed.fail(BundlerError::Other(message));
                    return Ok(BuildOutcome::Watching(FakeWatcher::boxed(
                        &config.name,
                        &self.log,
                    )));
                }
                ScriptResult::Fail(message) => {
                    self.event(format!("failed:{}", config.name));
                    return Err(BundlerError::Other(message));
                }
            };

            self.event(format!("built:{}", config.name));
            closed.signal();
            Ok(outcome)
        }
        .boxed()
    }

    fn create_server<'a>(
        &'a self,
        config: &'a BuildConfig,
    ) -> BoxFuture<'a, Result<Box<dyn DevServer>, BundlerError>> {
        async move {
            self.event(format!("serve:{}", config.name));
            if self.failing_servers.contains(&config.name) {
                return Err(BundlerError::Other(format!("{} cannot bind", config.name)));
            }

            let port = config
                .server
                .port
                .unwrap_or_else(|| self.next_port.fetch_add(1, Ordering::SeqCst));
            Ok(Box::new(FakeServer {
                name: config.name.clone(),
                port,
                listening: false,
                log: self.log.clone(),
                behavior: CloseBehavior::Succeed,
            }) as Box<dyn DevServer>)
        }
        .boxed()
    }
}

/// Proptest generators
pub mod generators {
    use proptest::prelude::*;

    /// Generate a valid renderer name
    pub fn renderer_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,15}"
    }

    /// Generate a list of distinct renderer names
    pub fn renderer_names(max: usize) -> impl Strategy<Value = Vec<String>> {
        proptest::collection::hash_set(renderer_name(), 1..=max)
            .prop_map(|names| names.into_iter().collect())
    }
}
