//! Build and dev server orchestration
//!
//! Drives the bundler through the two flows of a desktop app project:
//!
//! - **Production** ([`Orchestrator::pre_package`]): compile every non-UI
//!   target, then every renderer target.
//! - **Development** ([`Orchestrator::start_logic`]): launch a dev server
//!   per renderer target and write the bound ports back into the renderer
//!   configs, then compile the non-UI targets in watch mode. Non-UI
//!   targets embed the renderer URLs as compile-time constants, so the
//!   servers must be up first.

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::core::bundler::{BuildOutcome, BundleClosed, Bundler};
use crate::core::config_gen::{BuildConfig, ConfigGenerator};
use crate::core::lifecycle::{
    ExitOptions, HookRegistration, LifecycleController, LifecycleState, TeardownReport,
};
use crate::core::manifest::Manifest;
use crate::error::OrchestratorError;
use crate::infra::filesystem;

/// One step of the development start plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTask {
    /// Launch a dev server per renderer target
    LaunchDevServers,
    /// Compile the non-UI targets in watch mode
    CompileMain,
}

impl StartTask {
    /// Human readable title
    pub fn title(self) -> &'static str {
        match self {
            Self::LaunchDevServers => "Launching dev servers for renderer process code",
            Self::CompileMain => "Compiling main process code",
        }
    }

    /// Whether the step's output should stay on screen once it finishes
    pub fn persistent_output(self) -> bool {
        matches!(self, Self::LaunchDevServers)
    }
}

/// Ordered steps handed out by the first start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartPlan {
    /// Steps, to be run strictly in order
    pub tasks: Vec<StartTask>,
    /// Whether the plan itself keeps the app running; the hosting side
    /// launches the application when this is `false`
    pub blocking: bool,
}

impl StartPlan {
    fn development() -> Self {
        Self {
            // Non-UI targets embed the renderer dev server URLs.
            tasks: vec![StartTask::LaunchDevServers, StartTask::CompileMain],
            blocking: false,
        }
    }
}

/// Exit notification from the launched application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildExit {
    /// The child exited only to be restarted by the host
    pub restarted: bool,
    /// Exit code, if the child exited normally
    pub code: Option<i32>,
}

/// Drives builds and dev servers for one project
pub struct Orchestrator {
    bundler: Arc<dyn Bundler>,
    generator: ConfigGenerator,
    lifecycle: LifecycleController,
    hooks: Option<HookRegistration>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("generator", &self.generator)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator around a config generator and a bundler
    pub fn new(
        generator: ConfigGenerator,
        bundler: Arc<dyn Bundler>,
        lifecycle: LifecycleController,
    ) -> Self {
        Self {
            bundler,
            generator,
            lifecycle,
            hooks: None,
        }
    }

    /// Create a development-mode orchestrator for the project at `root`
    pub fn from_manifest(
        root: impl Into<PathBuf>,
        manifest: Manifest,
        bundler: Arc<dyn Bundler>,
    ) -> Self {
        let close_timeout = Duration::from_millis(manifest.shutdown.close_timeout_ms);
        Self::new(
            ConfigGenerator::new(root, manifest, false),
            bundler,
            LifecycleController::new(close_timeout),
        )
    }

    /// Lifecycle controller owning the tracked resources
    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    /// Config generator
    pub fn generator(&self) -> &ConfigGenerator {
        &self.generator
    }

    /// Mutable config generator
    pub fn generator_mut(&mut self) -> &mut ConfigGenerator {
        &mut self.generator
    }

    /// Install the interrupt and exit hooks for the rest of the session
    ///
    /// Calling this again replaces the previous registration.
    pub fn init(&mut self) {
        if let Some(previous) = self.hooks.take() {
            previous.deregister();
        }
        self.hooks = Some(self.lifecycle.init());
    }

    /// Compile the non-UI targets
    ///
    /// Every target starts right away on its own task. The call returns
    /// once each target has closed its first bundle, or with the first
    /// error any target reports. Targets still running at that point are
    /// left running and their watchers stay tracked.
    pub async fn build(&mut self, watch: bool) -> Result<(), OrchestratorError> {
        let configs = self.generator.build_configs(watch)?;
        tracing::info!("Compiling {} targets (watch: {watch})", configs.len());

        let mut pending: FuturesUnordered<_> = configs
            .into_iter()
            .map(|config| {
                let target = config.name.clone();
                let task = tokio::spawn(compile_target(
                    Arc::clone(&self.bundler),
                    self.lifecycle.clone(),
                    config,
                ));
                async move { (target, task.await) }
            })
            .collect();

        // Dropping a JoinHandle detaches its task, so returning early
        // leaves sibling targets running.
        while let Some((target, joined)) = pending.next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => {
                    return Err(OrchestratorError::TaskFailed {
                        target,
                        error: e.to_string(),
                    })
                }
            }
        }

        Ok(())
    }

    /// Compile the renderer targets one at a time
    ///
    /// Renderer builds may share an output directory, so each one finishes
    /// before the next starts. The first failure stops the sequence.
    pub async fn build_renderer(&mut self) -> Result<(), OrchestratorError> {
        let configs = self.generator.renderer_configs()?.to_vec();

        for config in configs {
            tracing::info!("Building renderer '{}'", config.name);
            let (closed, _first_pass) = BundleClosed::channel();
            let outcome = self.bundler.build(&config, closed).await.map_err(|source| {
                OrchestratorError::Compile {
                    target: config.name.clone(),
                    source,
                }
            })?;

            if let BuildOutcome::Watching(watcher) = outcome {
                self.lifecycle.register_watcher(watcher).await;
            }
        }

        Ok(())
    }

    /// Start a dev server per renderer target, in declaration order
    ///
    /// Once a server listens, its bound port is written into the renderer
    /// config so later non-UI configs embed the real URL.
    pub async fn launch_renderer_dev_servers(&mut self) -> Result<(), OrchestratorError> {
        let bundler = Arc::clone(&self.bundler);

        for config in self.generator.renderer_configs()?.iter_mut() {
            let server_error = |source| OrchestratorError::ServerStart {
                target: config.name.clone(),
                source,
            };

            let mut server = bundler.create_server(config).await.map_err(server_error)?;
            server.listen().await.map_err(server_error)?;
            let addr = server.local_addr();
            server.print_urls();
            self.lifecycle.register_server(server).await;

            match addr {
                Some(addr) if addr.port() != 0 => {
                    tracing::debug!("Renderer '{}' bound to {addr}", config.name);
                    config.server.port = Some(addr.port());
                }
                _ => tracing::debug!("Renderer '{}' reported no bound port", config.name),
            }
        }

        Ok(())
    }

    /// Hand out the development start plan
    ///
    /// Returns `None` when a start already happened; a second request is
    /// expected (for example when the host restarts its child) and is not
    /// an error.
    pub fn start_logic(&mut self) -> Result<Option<StartPlan>, OrchestratorError> {
        if !self.lifecycle.try_start() {
            tracing::debug!("Start requested again, ignoring");
            return Ok(None);
        }

        filesystem::remove_dir_all(&self.generator.base_dir())?;
        Ok(Some(StartPlan::development()))
    }

    /// Run one step of the start plan
    pub async fn run_start_task(&mut self, task: StartTask) -> Result<(), OrchestratorError> {
        tracing::debug!("Running start task: {}", task.title());
        match task {
            StartTask::LaunchDevServers => self.launch_renderer_dev_servers().await,
            StartTask::CompileMain => self.build(true).await,
        }
    }

    /// Hand out the start plan and run it to completion
    ///
    /// Returns `false` when a start already happened.
    pub async fn start(&mut self) -> Result<bool, OrchestratorError> {
        let Some(plan) = self.start_logic()? else {
            return Ok(false);
        };

        for task in plan.tasks {
            self.run_start_task(task).await?;
        }

        self.lifecycle.mark_running();
        Ok(true)
    }

    /// Production flow run before the app is packaged
    pub async fn pre_package(&mut self) -> Result<(), OrchestratorError> {
        self.generator.set_prod(true);
        filesystem::remove_dir_all(&self.generator.base_dir())?;

        self.build(false).await?;
        self.build_renderer().await
    }

    /// Tear everything down once the launched application exits
    ///
    /// A child that exits only to be restarted leaves the dev environment
    /// running.
    pub fn post_start<F>(&self, child_exit: F) -> JoinHandle<()>
    where
        F: Future<Output = ChildExit> + Send + 'static,
    {
        tracing::debug!("Hooking application process exit");
        let lifecycle = self.lifecycle.clone();

        tokio::spawn(async move {
            let exit = child_exit.await;
            if exit.restarted {
                tracing::debug!("Application restarted, keeping dev environment");
                return;
            }

            tracing::info!("Application exited ({:?}), shutting down", exit.code);
            lifecycle
                .exit_handler(ExitOptions::cleanup_and_exit(), None)
                .await;
        })
    }

    /// Handle a process exit request
    pub async fn exit_handler(
        &self,
        options: ExitOptions,
        error: Option<&(dyn std::error::Error + Send + Sync)>,
    ) -> TeardownReport {
        self.lifecycle.exit_handler(options, error).await
    }

    /// Remove the process hooks and close every tracked resource
    pub async fn shutdown(&mut self) -> TeardownReport {
        if let Some(hooks) = self.hooks.take() {
            hooks.deregister();
        }

        if self.lifecycle.state() == LifecycleState::Stopped
            && self.lifecycle.watcher_count() == 0
            && self.lifecycle.server_count() == 0
        {
            return TeardownReport::default();
        }

        self.lifecycle.cleanup().await
    }
}

/// Compile one non-UI target, resolving once its first bundle closes
async fn compile_target(
    bundler: Arc<dyn Bundler>,
    lifecycle: LifecycleController,
    config: BuildConfig,
) -> Result<(), OrchestratorError> {
    let (closed, first_pass) = BundleClosed::channel();

    let outcome = bundler
        .build(&config, closed)
        .await
        .map_err(|source| OrchestratorError::Compile {
            target: config.name.clone(),
            source,
        })?;

    if let BuildOutcome::Watching(watcher) = outcome {
        tracing::debug!("Tracking watcher for '{}'", config.name);
        lifecycle.register_watcher(watcher).await;
    }

    // A signal dropped without firing means the build ended without a
    // separate first-pass notification; the successful return above
    // already covers it. A failed first pass leaves the watcher tracked
    // so teardown still stops it.
    // TODO: restart the application when a watching build re-emits.
    if let Ok(Err(source)) = first_pass.await {
        return Err(OrchestratorError::Compile {
            target: config.name.clone(),
            source,
        });
    }

    tracing::info!("Compiled '{}'", config.name);
    Ok(())
}
