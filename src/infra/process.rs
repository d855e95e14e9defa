//! Process-backed bundler
//!
//! Runs the manifest's `build_command` and `serve_command` through the shell.
//! The target's build config is passed to the command as `BUNDLERIG_*`
//! environment variables:
//!
//! | Variable | Value |
//! |---|---|
//! | `BUNDLERIG_TARGET` | target name |
//! | `BUNDLERIG_KIND` | `main` or `renderer` |
//! | `BUNDLERIG_ROOT` | project root |
//! | `BUNDLERIG_ENTRY` | entry point (non-UI targets) |
//! | `BUNDLERIG_CONFIG` | bundler config file, if any |
//! | `BUNDLERIG_OUT_DIR` | output directory |
//! | `BUNDLERIG_MODE` | `production` or `development` |
//! | `BUNDLERIG_WATCH` | `true` or `false` |
//! | `BUNDLERIG_DEFINE` | compile-time constants as a JSON object |
//! | `BUNDLERIG_HOST` | dev server host |
//! | `BUNDLERIG_PORT` | dev server port, if fixed |
//!
//! A watching build is considered through its first pass once it prints a
//! line matching `ready_pattern`. A dev server is listening once it prints
//! a line matching `url_pattern`.

use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use std::net::{Ipv4Addr, SocketAddr};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::cli::output;
use crate::config::defaults;
use crate::core::bundler::{BuildOutcome, BundleClosed, Bundler, DevServer, WatchHandle};
use crate::core::config_gen::BuildConfig;
use crate::core::manifest::BundlerConfig;
use crate::error::{BundlerError, ConfigError};
use crate::infra::probe;

type OutputLines = Lines<BufReader<ChildStdout>>;

/// Bundler driving external commands
#[derive(Debug, Clone)]
pub struct CommandBundler {
    build_command: Option<String>,
    serve_command: Option<String>,
    ready_pattern: Regex,
    url_pattern: Regex,
    listen_timeout: Duration,
    probe: bool,
    readiness_budget: Duration,
}

impl CommandBundler {
    /// Create a bundler from the manifest's `[bundler]` section
    pub fn from_config(config: &BundlerConfig) -> Result<Self, ConfigError> {
        let compile = |field: &str, pattern: &str| {
            Regex::new(pattern).map_err(|e| ConfigError::InvalidValue {
                field: field.to_string(),
                message: e.to_string(),
            })
        };

        Ok(Self {
            build_command: config.build_command.clone(),
            serve_command: config.serve_command.clone(),
            ready_pattern: compile("bundler.ready_pattern", &config.ready_pattern)?,
            url_pattern: compile("bundler.url_pattern", &config.url_pattern)?,
            listen_timeout: Duration::from_millis(config.listen_timeout_ms),
            probe: config.probe,
            readiness_budget: Duration::from_millis(defaults::READINESS_BUDGET_MS),
        })
    }

    async fn build_once(&self, command: &str, config: &BuildConfig) -> Result<(), BundlerError> {
        let status = shell(command, config)?
            .stdout(Stdio::inherit())
            .status()
            .await
            .map_err(|e| spawn_error(command, &e))?;

        if status.success() {
            Ok(())
        } else {
            Err(BundlerError::Exited {
                command: command.to_string(),
                status: status.to_string(),
            })
        }
    }

    fn build_watching(
        &self,
        command: &str,
        config: &BuildConfig,
        closed: BundleClosed,
    ) -> Result<BuildOutcome, BundlerError> {
        let mut child = shell(command, config)?
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(command, &e))?;
        let lines = take_lines(&mut child)?;

        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(supervise_watch(
            WatchProcess {
                name: config.name.clone(),
                command: command.to_string(),
                ready_pattern: self.ready_pattern.clone(),
                child,
                lines,
            },
            closed,
            stopped,
        ));

        Ok(BuildOutcome::Watching(Box::new(ProcessWatcher {
            name: config.name.clone(),
            stop: Some(stop),
            task: Some(task),
        })))
    }
}

impl Bundler for CommandBundler {
    fn build<'a>(
        &'a self,
        config: &'a BuildConfig,
        closed: BundleClosed,
    ) -> BoxFuture<'a, Result<BuildOutcome, BundlerError>> {
        async move {
            let command = self
                .build_command
                .as_deref()
                .ok_or_else(|| BundlerError::MissingCommand {
                    kind: "build".to_string(),
                })?;

            tracing::debug!("Running '{command}' for '{}'", config.name);
            if config.watch {
                self.build_watching(command, config, closed)
            } else {
                self.build_once(command, config).await?;
                closed.signal();
                Ok(BuildOutcome::OneShot)
            }
        }
        .boxed()
    }

    fn create_server<'a>(
        &'a self,
        config: &'a BuildConfig,
    ) -> BoxFuture<'a, Result<Box<dyn DevServer>, BundlerError>> {
        async move {
            let command =
                self.serve_command
                    .clone()
                    .ok_or_else(|| BundlerError::MissingCommand {
                        kind: "serve".to_string(),
                    })?;

            Ok(Box::new(ProcessDevServer {
                command,
                config: config.clone(),
                url_pattern: self.url_pattern.clone(),
                listen_timeout: self.listen_timeout,
                probe: self.probe.then_some(self.readiness_budget),
                child: None,
                output: None,
                url: None,
                addr: None,
            }) as Box<dyn DevServer>)
        }
        .boxed()
    }
}

/// A watching build process
///
/// The process is supervised by a background task that forwards its
/// output and fires the first-pass signal once `ready_pattern` matches.
pub struct ProcessWatcher {
    name: String,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), BundlerError>>>,
}

impl WatchHandle for ProcessWatcher {
    fn close(&mut self) -> BoxFuture<'_, Result<(), BundlerError>> {
        async move {
            tracing::debug!("Stopping watcher for '{}'", self.name);
            if let Some(stop) = self.stop.take() {
                // The supervisor is gone already if the process exited.
                let _ = stop.send(());
            }
            let Some(task) = self.task.take() else {
                return Ok(());
            };
            task.await.map_err(|e| BundlerError::Close {
                what: self.name.clone(),
                error: e.to_string(),
            })?
        }
        .boxed()
    }
}

struct WatchProcess {
    name: String,
    command: String,
    ready_pattern: Regex,
    child: Child,
    lines: OutputLines,
}

/// Forward a watching build's output until it exits or is stopped
///
/// Until the first pass finishes, `closed` is still pending: a match of
/// the ready pattern signals it, an unsuccessful exit fails it.
async fn supervise_watch(
    mut process: WatchProcess,
    closed: BundleClosed,
    mut stop: oneshot::Receiver<()>,
) -> Result<(), BundlerError> {
    let mut closed = Some(closed);

    loop {
        let line = tokio::select! {
            _ = &mut stop => return stop_child(&mut process.child, &process.name).await,
            line = next_line(&mut process.lines, &process.command) => line,
        };

        match line {
            Ok(Some(line)) => {
                forward_line(&process.name, &line);
                if process.ready_pattern.is_match(&line) {
                    if let Some(closed) = closed.take() {
                        closed.signal();
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("{e}");
                break;
            }
        }
    }

    let status = tokio::select! {
        _ = &mut stop => return stop_child(&mut process.child, &process.name).await,
        status = process.child.wait() => status,
    };
    let status = match status {
        Ok(status) => status,
        Err(e) => {
            let error = spawn_error(&process.command, &e);
            return match closed {
                Some(closed) => {
                    closed.fail(error);
                    Ok(())
                }
                None => Err(error),
            };
        }
    };

    match closed {
        Some(closed) if !status.success() => closed.fail(BundlerError::Exited {
            command: process.command,
            status: status.to_string(),
        }),
        Some(closed) => {
            tracing::debug!("'{}' exited without watching", process.name);
            closed.signal();
        }
        None => tracing::warn!("'{}' stopped watching ({status})", process.name),
    }
    Ok(())
}

/// A dev server process
pub struct ProcessDevServer {
    command: String,
    config: BuildConfig,
    url_pattern: Regex,
    listen_timeout: Duration,
    /// Readiness budget, when probing is enabled
    probe: Option<Duration>,
    child: Option<Child>,
    output: Option<JoinHandle<()>>,
    url: Option<String>,
    addr: Option<SocketAddr>,
}

impl ProcessDevServer {
    async fn wait_for_url(&self, lines: &mut OutputLines) -> Result<(String, u16), BundlerError> {
        loop {
            let Some(line) = next_line(lines, &self.command).await? else {
                return Err(BundlerError::Other(format!(
                    "'{}' exited before reporting a URL",
                    self.command
                )));
            };

            forward_line(&self.config.name, &line);
            if let Some(found) = self.url_pattern.captures(&line).and_then(|caps| {
                let port = caps.get(1)?.as_str().parse::<u16>().ok()?;
                Some((caps.get(0)?.as_str().to_string(), port))
            }) {
                return Ok(found);
            }
        }
    }
}

impl DevServer for ProcessDevServer {
    fn listen(&mut self) -> BoxFuture<'_, Result<(), BundlerError>> {
        async move {
            if self.child.is_some() {
                return Ok(());
            }

            let mut child = shell(&self.command, &self.config)?
                .stdout(Stdio::piped())
                .spawn()
                .map_err(|e| spawn_error(&self.command, &e))?;
            let mut lines = take_lines(&mut child)?;

            let reported = tokio::time::timeout(self.listen_timeout, self.wait_for_url(&mut lines))
                .await
                .unwrap_or_else(|_| {
                    Err(BundlerError::NoUrlReported {
                        command: self.command.clone(),
                        timeout_ms: u64::try_from(self.listen_timeout.as_millis())
                            .unwrap_or(u64::MAX),
                    })
                });
            let (url, port) = match reported {
                Ok(found) => found,
                Err(e) => {
                    let _ = stop_child(&mut child, &self.config.name).await;
                    return Err(e);
                }
            };

            if let Some(budget) = self.probe {
                if let Err(e) = probe::wait_until_ready(&url, budget).await {
                    let _ = stop_child(&mut child, &self.config.name).await;
                    return Err(e);
                }
            }

            tracing::debug!("Dev server for '{}' listening at {url}", self.config.name);
            self.output = Some(tokio::spawn(forward_output(self.config.name.clone(), lines)));
            self.addr = Some(SocketAddr::from((Ipv4Addr::LOCALHOST, port)));
            self.url = Some(url);
            self.child = Some(child);
            Ok(())
        }
        .boxed()
    }

    fn print_urls(&self) {
        if let Some(url) = &self.url {
            output::print_detail(&format!("{} Local:   {url}", self.config.name));
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), BundlerError>> {
        async move {
            if let Some(output) = self.output.take() {
                output.abort();
            }
            let Some(mut child) = self.child.take() else {
                return Ok(());
            };
            tracing::debug!("Stopping dev server for '{}'", self.config.name);
            stop_child(&mut child, &self.config.name).await
        }
        .boxed()
    }
}

fn env_name(suffix: &str) -> String {
    format!("{}_{suffix}", defaults::ENV_PREFIX)
}

/// Build a shell invocation of `command` carrying `config` in its environment
fn shell(command: &str, config: &BuildConfig) -> Result<Command, BundlerError> {
    let define = serde_json::to_string(&config.define)
        .map_err(|e| BundlerError::Other(format!("Failed to encode defines: {e}")))?;

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(&config.root)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .env(env_name("TARGET"), &config.name)
        .env(env_name("KIND"), config.kind.as_str())
        .env(env_name("ROOT"), &config.root)
        .env(env_name("OUT_DIR"), &config.out_dir)
        .env(env_name("MODE"), config.mode.as_str())
        .env(env_name("WATCH"), config.watch.to_string())
        .env(env_name("DEFINE"), define)
        .env(env_name("HOST"), &config.server.host);

    if let Some(entry) = &config.entry {
        cmd.env(env_name("ENTRY"), entry);
    }
    if let Some(config_file) = &config.config_file {
        cmd.env(env_name("CONFIG"), config_file);
    }
    if let Some(port) = config.server.port {
        cmd.env(env_name("PORT"), port.to_string());
    }

    Ok(cmd)
}

fn spawn_error(command: &str, error: &std::io::Error) -> BundlerError {
    BundlerError::Spawn {
        command: command.to_string(),
        error: error.to_string(),
    }
}

fn take_lines(child: &mut Child) -> Result<OutputLines, BundlerError> {
    child
        .stdout
        .take()
        .map(|stdout| BufReader::new(stdout).lines())
        .ok_or_else(|| BundlerError::Other("Child stdout was not captured".to_string()))
}

async fn next_line(lines: &mut OutputLines, command: &str) -> Result<Option<String>, BundlerError> {
    lines.next_line().await.map_err(|e| BundlerError::Other(format!(
        "Failed to read output of '{command}': {e}"
    )))
}

fn forward_line(target: &str, line: &str) {
    tracing::info!("[{target}] {line}");
}

async fn forward_output(target: String, mut lines: OutputLines) {
    while let Ok(Some(line)) = lines.next_line().await {
        forward_line(&target, &line);
    }
}

async fn stop_child(child: &mut Child, name: &str) -> Result<(), BundlerError> {
    if let Ok(Some(status)) = child.try_wait() {
        tracing::debug!("'{name}' already exited with {status}");
        return Ok(());
    }
    child.kill().await.map_err(|e| BundlerError::Close {
        what: name.to_string(),
        error: e.to_string(),
    })
}
