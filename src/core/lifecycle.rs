//! Process lifecycle: start guard, termination hooks and teardown
//!
//! Every long-lived resource obtained from the bundler (watchers and dev
//! servers) is registered here and released exactly once during teardown.
//! Watchers are always closed before servers.

use futures::future::{join_all, BoxFuture};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::defaults;
use crate::core::bundler::{DevServer, WatchHandle};
use crate::error::BundlerError;

/// Process termination function, called with the exit code
pub type Terminator = fn(i32);

/// Lifecycle of an orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing started yet
    Unstarted,
    /// The start plan has been handed out and is running
    Starting,
    /// Dev servers and/or watchers are active
    Running,
    /// Tracked resources are being closed
    TearingDown,
    /// Both tracking sets are empty
    Stopped,
}

/// What the exit handler should do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitOptions {
    /// Close every tracked watcher and dev server
    pub cleanup: bool,
    /// Terminate the process afterwards
    pub exit: bool,
}

impl ExitOptions {
    /// Clean up without terminating
    pub fn cleanup() -> Self {
        Self {
            cleanup: true,
            exit: false,
        }
    }

    /// Clean up, then terminate
    pub fn cleanup_and_exit() -> Self {
        Self {
            cleanup: true,
            exit: true,
        }
    }
}

/// Outcome of a teardown pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Watchers a close was issued for
    pub watchers: usize,
    /// Dev servers a close was issued for
    pub servers: usize,
    /// Closes that failed or timed out
    pub failures: usize,
}

#[derive(Default)]
struct Resources {
    watchers: Vec<Box<dyn WatchHandle>>,
    servers: Vec<Box<dyn DevServer>>,
    /// Set once teardown has drained the sets; late handles are not tracked
    draining: bool,
}

struct Shared {
    resources: Mutex<Resources>,
    state: Mutex<LifecycleState>,
    started: AtomicBool,
    close_timeout: Duration,
    terminator: Terminator,
}

/// Owns the tracked resources and drives teardown
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct LifecycleController {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("state", &self.state())
            .field("watchers", &self.watcher_count())
            .field("servers", &self.server_count())
            .finish_non_exhaustive()
    }
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new(Duration::from_millis(defaults::CLOSE_TIMEOUT_MS))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LifecycleController {
    /// Create a controller that terminates with [`std::process::exit`]
    pub fn new(close_timeout: Duration) -> Self {
        Self::with_terminator(close_timeout, |code| std::process::exit(code))
    }

    /// Create a controller with a custom termination function
    pub fn with_terminator(close_timeout: Duration, terminator: Terminator) -> Self {
        Self {
            shared: Arc::new(Shared {
                resources: Mutex::new(Resources::default()),
                state: Mutex::new(LifecycleState::Unstarted),
                started: AtomicBool::new(false),
                close_timeout,
                terminator,
            }),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        *lock(&self.shared.state)
    }

    fn set_state(&self, state: LifecycleState) {
        let mut current = lock(&self.shared.state);
        tracing::debug!("Lifecycle {:?} -> {:?}", *current, state);
        *current = state;
    }

    /// Flip the start guard; `false` if a start already happened
    pub fn try_start(&self) -> bool {
        let first = self
            .shared
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if first {
            self.set_state(LifecycleState::Starting);
        }
        first
    }

    /// Record that the start plan finished
    pub fn mark_running(&self) {
        let mut state = lock(&self.shared.state);
        if *state == LifecycleState::Starting {
            tracing::debug!("Lifecycle Starting -> Running");
            *state = LifecycleState::Running;
        }
    }

    /// Number of tracked watchers
    pub fn watcher_count(&self) -> usize {
        lock(&self.shared.resources).watchers.len()
    }

    /// Number of tracked dev servers
    pub fn server_count(&self) -> usize {
        lock(&self.shared.resources).servers.len()
    }

    /// Bound addresses of the tracked dev servers, in launch order
    pub fn server_addrs(&self) -> Vec<Option<SocketAddr>> {
        lock(&self.shared.resources)
            .servers
            .iter()
            .map(|server| server.local_addr())
            .collect()
    }

    /// Track a watcher until teardown
    ///
    /// A watcher arriving after teardown started is closed right away.
    pub async fn register_watcher(&self, watcher: Box<dyn WatchHandle>) {
        let rejected = {
            let mut resources = lock(&self.shared.resources);
            if resources.draining {
                Some(watcher)
            } else {
                resources.watchers.push(watcher);
                None
            }
        };

        if let Some(mut watcher) = rejected {
            tracing::warn!("Watcher obtained during teardown, closing it immediately");
            self.close_bounded("watcher", watcher.close()).await;
        }
    }

    /// Track a dev server until teardown
    ///
    /// A server arriving after teardown started is closed right away.
    pub async fn register_server(&self, server: Box<dyn DevServer>) {
        let rejected = {
            let mut resources = lock(&self.shared.resources);
            if resources.draining {
                Some(server)
            } else {
                resources.servers.push(server);
                None
            }
        };

        if let Some(mut server) = rejected {
            tracing::warn!("Dev server started during teardown, closing it immediately");
            self.close_bounded("dev server", server.close()).await;
        }
    }

    async fn close_bounded(
        &self,
        what: &str,
        close: BoxFuture<'_, Result<(), BundlerError>>,
    ) -> bool {
        match tokio::time::timeout(self.shared.close_timeout, close).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!("Failed to close {what}: {e}");
                false
            }
            Err(_) => {
                tracing::warn!(
                    "Closing {what} timed out after {}ms",
                    self.shared.close_timeout.as_millis()
                );
                false
            }
        }
    }

    /// Close every tracked watcher, then every tracked dev server
    ///
    /// Each close is bounded by the close timeout. Failures are logged and
    /// counted, never returned. Calling this again with nothing tracked is
    /// a no-op.
    pub async fn cleanup(&self) -> TeardownReport {
        self.set_state(LifecycleState::TearingDown);

        let mut watchers = {
            let mut resources = lock(&self.shared.resources);
            resources.draining = true;
            std::mem::take(&mut resources.watchers)
        };
        let watcher_results = join_all(watchers.iter_mut().map(|watcher| {
            tracing::debug!("Cleaning watcher");
            self.close_bounded("watcher", watcher.close())
        }))
        .await;

        let mut servers = std::mem::take(&mut lock(&self.shared.resources).servers);
        let server_results = join_all(servers.iter_mut().map(|server| {
            tracing::debug!("Cleaning dev server");
            self.close_bounded("dev server", server.close())
        }))
        .await;

        let failures = watcher_results
            .iter()
            .chain(server_results.iter())
            .filter(|closed| !**closed)
            .count();

        self.set_state(LifecycleState::Stopped);

        TeardownReport {
            watchers: watcher_results.len(),
            servers: server_results.len(),
            failures,
        }
    }

    /// Drop every tracked handle without awaiting a close
    ///
    /// Used from synchronous exit paths; handles release their resources
    /// when dropped.
    pub fn release_all(&self) -> TeardownReport {
        let (watchers, servers) = {
            let mut resources = lock(&self.shared.resources);
            resources.draining = true;
            (
                std::mem::take(&mut resources.watchers),
                std::mem::take(&mut resources.servers),
            )
        };

        let report = TeardownReport {
            watchers: watchers.len(),
            servers: servers.len(),
            failures: 0,
        };
        if report.watchers + report.servers > 0 {
            tracing::debug!(
                "Releasing {} watchers and {} dev servers on exit",
                report.watchers,
                report.servers
            );
        }
        drop(watchers);
        drop(servers);

        self.set_state(LifecycleState::Stopped);
        report
    }

    /// Handle a process exit request
    ///
    /// Cleans up when asked to, logs `error` if one is given, then
    /// terminates when asked to.
    pub async fn exit_handler(
        &self,
        options: ExitOptions,
        error: Option<&(dyn std::error::Error + Send + Sync)>,
    ) -> TeardownReport {
        tracing::debug!("Handling process exit with: {options:?}");

        let report = if options.cleanup {
            self.cleanup().await
        } else {
            TeardownReport::default()
        };

        if let Some(error) = error {
            tracing::error!("{error}");
        }

        if options.exit {
            (self.shared.terminator)(0);
        }

        report
    }

    /// Install the interrupt and exit hooks
    ///
    /// Must be called from within a tokio runtime. The hooks stay active
    /// until the returned registration is deregistered or dropped.
    pub fn init(&self) -> HookRegistration {
        self.init_with(tokio::signal::ctrl_c())
    }

    /// Install the hooks, treating `interrupt` as the interrupt signal
    pub fn init_with<F>(&self, interrupt: F) -> HookRegistration
    where
        F: Future<Output = std::io::Result<()>> + Send + 'static,
    {
        tracing::debug!("Hooking process events");

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let controller = self.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {}
                result = interrupt => match result {
                    Ok(()) => {
                        tracing::info!("Interrupt received, shutting down");
                        controller
                            .exit_handler(ExitOptions::cleanup_and_exit(), None)
                            .await;
                    }
                    Err(e) => tracing::warn!("Unable to listen for interrupt: {e}"),
                },
            }
        });

        HookRegistration {
            controller: self.clone(),
            token,
            armed: true,
        }
    }
}

/// Installed process hooks
///
/// Dropping the registration runs the exit hook (releasing every tracked
/// resource) and stops listening for interrupts. [`deregister`] removes
/// the hooks without running the exit hook.
///
/// [`deregister`]: HookRegistration::deregister
pub struct HookRegistration {
    controller: LifecycleController,
    token: CancellationToken,
    armed: bool,
}

impl HookRegistration {
    /// Remove the hooks
    pub fn deregister(mut self) {
        tracing::debug!("Unhooking process events");
        self.armed = false;
        self.token.cancel();
    }
}

impl std::fmt::Debug for HookRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistration")
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}

impl Drop for HookRegistration {
    fn drop(&mut self) {
        self.token.cancel();
        if self.armed {
            self.controller.release_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CloseLog, FakeServer, FakeWatcher};
    use std::sync::atomic::AtomicI32;

    fn controller() -> LifecycleController {
        LifecycleController::with_terminator(Duration::from_millis(200), |_| {})
    }

    #[test]
    fn test_start_guard_flips_once() {
        let lifecycle = controller();
        assert_eq!(lifecycle.state(), LifecycleState::Unstarted);

        assert!(lifecycle.try_start());
        assert!(!lifecycle.try_start());
        assert!(!lifecycle.try_start());
        assert_eq!(lifecycle.state(), LifecycleState::Starting);

        lifecycle.mark_running();
        assert_eq!(lifecycle.state(), LifecycleState::Running);
    }

    #[tokio::test]
    async fn test_cleanup_closes_watchers_before_servers() {
        let lifecycle = controller();
        let log = CloseLog::default();

        lifecycle.register_server(FakeServer::boxed("s1", 4000, &log)).await;
        lifecycle.register_watcher(FakeWatcher::boxed("w1", &log)).await;
        lifecycle.register_watcher(FakeWatcher::boxed("w2", &log)).await;
        lifecycle.register_server(FakeServer::boxed("s2", 4001, &log)).await;

        let report = lifecycle.cleanup().await;

        assert_eq!(report.watchers, 2);
        assert_eq!(report.servers, 2);
        assert_eq!(report.failures, 0);
        let closed = log.entries();
        assert_eq!(closed.len(), 4);
        let first_server = closed.iter().position(|c| c.starts_with('s')).unwrap();
        assert!(closed[..first_server].iter().all(|c| c.starts_with('w')));
        assert_eq!(lifecycle.watcher_count(), 0);
        assert_eq!(lifecycle.server_count(), 0);
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_cleanup_continues_past_failures() {
        let lifecycle = controller();
        let log = CloseLog::default();

        lifecycle.register_watcher(FakeWatcher::failing("w1", &log)).await;
        lifecycle.register_watcher(FakeWatcher::boxed("w2", &log)).await;
        lifecycle.register_server(FakeServer::failing("s1", 4000, &log)).await;
        lifecycle.register_server(FakeServer::boxed("s2", 4001, &log)).await;

        let report = lifecycle.cleanup().await;

        assert_eq!(report.failures, 2);
        assert_eq!(log.count("w1"), 1);
        assert_eq!(log.count("w2"), 1);
        assert_eq!(log.count("s1"), 1);
        assert_eq!(log.count("s2"), 1);
        assert_eq!(lifecycle.watcher_count(), 0);
        assert_eq!(lifecycle.server_count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_bounds_hanging_close() {
        let lifecycle = controller();
        let log = CloseLog::default();

        lifecycle.register_watcher(FakeWatcher::hanging("w1", &log)).await;
        lifecycle.register_server(FakeServer::boxed("s1", 4000, &log)).await;

        let report = tokio::time::timeout(Duration::from_secs(5), lifecycle.cleanup())
            .await
            .expect("cleanup must not hang");

        assert_eq!(report.failures, 1);
        assert_eq!(log.count("s1"), 1);
    }

    #[tokio::test]
    async fn test_repeated_cleanup_is_noop() {
        let lifecycle = controller();
        let log = CloseLog::default();
        lifecycle.register_watcher(FakeWatcher::boxed("w1", &log)).await;

        lifecycle.exit_handler(ExitOptions::cleanup(), None).await;
        let report = lifecycle.exit_handler(ExitOptions::cleanup(), None).await;

        assert_eq!(report, TeardownReport::default());
        assert_eq!(log.count("w1"), 1);
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_watcher_after_teardown_is_closed_not_tracked() {
        let lifecycle = controller();
        let log = CloseLog::default();

        lifecycle.cleanup().await;
        lifecycle.register_watcher(FakeWatcher::boxed("late", &log)).await;

        assert_eq!(lifecycle.watcher_count(), 0);
        assert_eq!(log.count("late"), 1);
    }

    #[tokio::test]
    async fn test_exit_handler_without_cleanup_keeps_resources() {
        let lifecycle = controller();
        let log = CloseLog::default();
        lifecycle.register_watcher(FakeWatcher::boxed("w1", &log)).await;

        let report = lifecycle.exit_handler(ExitOptions::default(), None).await;

        assert_eq!(report, TeardownReport::default());
        assert_eq!(lifecycle.watcher_count(), 1);
    }

    static EXIT_CODE: AtomicI32 = AtomicI32::new(-1);

    #[tokio::test]
    async fn test_exit_handler_terminates_after_cleanup() {
        let lifecycle = LifecycleController::with_terminator(Duration::from_millis(200), |code| {
            EXIT_CODE.store(code, Ordering::SeqCst);
        });
        let log = CloseLog::default();
        lifecycle.register_server(FakeServer::boxed("s1", 4000, &log)).await;

        let error: Box<dyn std::error::Error + Send + Sync> =
            Box::new(BundlerError::Other("boom".to_string()));
        lifecycle
            .exit_handler(ExitOptions::cleanup_and_exit(), Some(error.as_ref()))
            .await;

        assert_eq!(EXIT_CODE.load(Ordering::SeqCst), 0);
        assert_eq!(log.count("s1"), 1);
    }

    #[tokio::test]
    async fn test_dropping_registration_releases_resources() {
        let lifecycle = controller();
        let log = CloseLog::default();
        lifecycle.register_watcher(FakeWatcher::boxed("w1", &log)).await;
        lifecycle.register_server(FakeServer::boxed("s1", 4000, &log)).await;

        let hooks = lifecycle.init();
        drop(hooks);

        assert_eq!(lifecycle.watcher_count(), 0);
        assert_eq!(lifecycle.server_count(), 0);
        assert_eq!(log.dropped(), 2);
    }

    static INTERRUPT_EXIT_CODE: AtomicI32 = AtomicI32::new(-1);

    #[tokio::test]
    async fn test_interrupt_cleans_up_and_terminates() {
        let lifecycle = LifecycleController::with_terminator(Duration::from_millis(200), |code| {
            INTERRUPT_EXIT_CODE.store(code, Ordering::SeqCst);
        });
        let log = CloseLog::default();
        lifecycle.register_watcher(FakeWatcher::failing("w1", &log)).await;
        lifecycle.register_server(FakeServer::boxed("s1", 4000, &log)).await;

        let (interrupt, received) = tokio::sync::oneshot::channel::<()>();
        let _hooks = lifecycle.init_with(async move { received.await.map_err(std::io::Error::other) });
        interrupt.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while INTERRUPT_EXIT_CODE.load(Ordering::SeqCst) == -1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("interrupt must terminate the process");

        assert_eq!(INTERRUPT_EXIT_CODE.load(Ordering::SeqCst), 0);
        assert_eq!(log.count("w1"), 1);
        assert_eq!(log.count("s1"), 1);
        assert_eq!(lifecycle.watcher_count(), 0);
        assert_eq!(lifecycle.server_count(), 0);
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_deregister_keeps_resources() {
        let lifecycle = controller();
        let log = CloseLog::default();
        lifecycle.register_watcher(FakeWatcher::boxed("w1", &log)).await;

        lifecycle.init().deregister();

        assert_eq!(lifecycle.watcher_count(), 1);
        assert_eq!(log.dropped(), 0);
    }
}
