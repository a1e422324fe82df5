//! # Sandbox Command Executor
//!
//! File: cli/src/monitor/sandbox.rs
//!
//! ## Overview
//!
//! Owns the single long-lived tools container and runs shell commands in it, one at a
//! time. Probes running in sandbox mode send every `ping`, `iperf3` and `curl` through
//! here.
//!
//! ```text
//! Uninitialized ──exec──▶ Creating ──▶ Running ⇄ Busy
//!                                        │  ▲
//!                             not running ▼  │
//!                                     Restarting
//! ```
//!
//! ## Architecture
//!
//! - **Gate**: a `tokio::sync::Semaphore` with one permit. Tokio's semaphore is fair, so
//!   waiting callers are served strictly in arrival order. A caller that is dropped while
//!   waiting (or while running) gives its place back automatically.
//! - **Health**: before each command the runtime is asked whether the container is
//!   running. A missing container is created; a stopped one is restarted. Creation is
//!   retried once with a reduced configuration (no host networking, no added
//!   capabilities) before giving up with `SandboxUnavailable`.
//! - **Runtime seam**: container handling sits behind `SandboxRuntime`. `DockerRuntime`
//!   implements it with bollard; tests substitute a recording stub.
//!
//! Each command runs under `timeout -s KILL` in the container, so one that overruns its
//! budget is stopped there and cannot overlap the next caller's command.
//!
//! Output is inspected for unreachable-network markers (`NetworkUnreachable`). Non-zero
//! exit codes are only logged: `ping` exits 1 for an offline host and its output is
//! still what the caller wants.
//!
use crate::common::docker::{self, ExecOutput};
use crate::common::process::{unreachable_marker, CommandRunner};
use crate::core::config::SandboxConfig;
use crate::core::error::{LanwatchError, Result};
use anyhow::anyhow;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

/// Container operations the executor needs.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    async fn is_running(&self) -> Result<bool>;

    /// Creates and starts the container. `reduced` drops host networking and capabilities.
    async fn create(&self, reduced: bool) -> Result<()>;

    async fn restart(&self) -> Result<()>;

    /// Runs `sh -c <command>` in the container. The command must be killed inside the
    /// container once `deadline` has passed, whether or not the caller is still waiting.
    async fn exec(&self, command: &str, deadline: Duration) -> Result<ExecOutput>;

    /// Stops and removes the container.
    async fn shutdown(&self) -> Result<()>;
}

/// Exit codes of `timeout` when it had to stop the command (TERM, KILL).
const DEADLINE_EXIT_CODES: [i64; 2] = [124, 137];

/// Extra wait on the client side for the container to report a killed command.
const EXEC_KILL_GRACE: Duration = Duration::from_secs(3);

/// `sh -c <command>` under `timeout -s KILL`, rounded up to whole seconds.
fn deadline_command(command: &str, deadline: Duration) -> Vec<String> {
    let secs = deadline.as_millis().div_ceil(1000).max(1);
    vec![
        "timeout".to_string(),
        "-s".to_string(),
        "KILL".to_string(),
        secs.to_string(),
        "sh".to_string(),
        "-c".to_string(),
        command.to_string(),
    ]
}

fn timed_out(command: &str, timeout: Duration) -> anyhow::Error {
    warn!("Sandbox command timed out after {:?}: {}", timeout, command);
    anyhow!(LanwatchError::CommandTimeout {
        cmd: command.to_string(),
        timeout_ms: timeout.as_millis() as u64,
    })
}

/// `SandboxRuntime` backed by the local Docker daemon.
pub struct DockerRuntime {
    cfg: SandboxConfig,
}

impl DockerRuntime {
    pub fn new(cfg: SandboxConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl SandboxRuntime for DockerRuntime {
    async fn is_running(&self) -> Result<bool> {
        docker::container_running(&self.cfg.container_name).await
    }

    async fn create(&self, reduced: bool) -> Result<()> {
        docker::create_tools_container(&self.cfg, reduced).await
    }

    async fn restart(&self) -> Result<()> {
        docker::restart_container(&self.cfg.container_name).await
    }

    async fn exec(&self, command: &str, deadline: Duration) -> Result<ExecOutput> {
        docker::exec_capture(&self.cfg.container_name, &deadline_command(command, deadline)).await
    }

    async fn shutdown(&self) -> Result<()> {
        docker::remove_container(&self.cfg.container_name, true).await
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorState {
    Uninitialized,
    Creating,
    Running,
    Busy,
    Restarting,
}

/// Point-in-time view of the executor.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorStatus {
    pub state: ExecutorState,
    /// Callers waiting for the gate.
    pub queued: usize,
    /// Commands completed since start.
    pub executed: u64,
}

/// Serialized command executor over one tools container.
pub struct SandboxCommandExecutor {
    runtime: Arc<dyn SandboxRuntime>,
    gate: Semaphore,
    state: Mutex<ExecutorState>,
    queued: AtomicUsize,
    executed: AtomicU64,
    default_timeout: Duration,
}

/// Decrements the waiting counter when the caller leaves the queue, however it leaves.
struct QueueSlot<'a>(&'a AtomicUsize);

impl<'a> QueueSlot<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Holds `Busy` for the duration of one command and resets to `Running` on drop.
struct BusyMark<'a>(&'a SandboxCommandExecutor);

impl Drop for BusyMark<'_> {
    fn drop(&mut self) {
        self.0.set_state(ExecutorState::Running);
    }
}

impl SandboxCommandExecutor {
    pub fn new(runtime: Arc<dyn SandboxRuntime>, default_timeout: Duration) -> Self {
        Self {
            runtime,
            gate: Semaphore::new(1),
            state: Mutex::new(ExecutorState::Uninitialized),
            queued: AtomicUsize::new(0),
            executed: AtomicU64::new(0),
            default_timeout,
        }
    }

    /// Executor over the Docker tools container described by `cfg`.
    pub fn docker(cfg: &SandboxConfig) -> Self {
        Self::new(
            Arc::new(DockerRuntime::new(cfg.clone())),
            Duration::from_millis(cfg.exec_timeout_ms),
        )
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn state(&self) -> ExecutorState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: ExecutorState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    pub fn status(&self) -> ExecutorStatus {
        ExecutorStatus {
            state: self.state(),
            queued: self.queued.load(Ordering::SeqCst),
            executed: self.executed.load(Ordering::SeqCst),
        }
    }

    /// Runs `command` in the tools container and returns combined stdout and stderr.
    ///
    /// Waits its turn behind earlier callers. The timeout covers the command itself, not
    /// time spent queued. A command that overruns is killed inside the container before
    /// the next caller is let through.
    ///
    /// # Errors
    ///
    /// * `SandboxUnavailable` - the container could not be brought up.
    /// * `CommandTimeout` - the command ran longer than `timeout`.
    /// * `NetworkUnreachable` - the output reports an unreachable network or unknown host.
    #[instrument(skip(self), fields(timeout_ms = timeout.as_millis() as u64))]
    pub async fn exec(&self, command: &str, timeout: Duration) -> Result<String> {
        let slot = QueueSlot::enter(&self.queued);
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| anyhow!(LanwatchError::SandboxUnavailable("executor closed".into())))?;
        drop(slot);

        self.ensure_ready().await?;

        self.set_state(ExecutorState::Busy);
        let busy = BusyMark(self);
        debug!("sandbox exec: {}", command);
        let started = Instant::now();
        // The permit is held until the container has stopped the command, not merely
        // until the caller stops waiting for it.
        let client_budget = timeout.saturating_add(EXEC_KILL_GRACE);
        let result = tokio::time::timeout(client_budget, self.runtime.exec(command, timeout)).await;
        drop(busy);

        let out = match result {
            Ok(Ok(out))
                if DEADLINE_EXIT_CODES.contains(&out.exit_code) && started.elapsed() >= timeout =>
            {
                return Err(timed_out(command, timeout));
            }
            Ok(out) => out?,
            Err(_) => return Err(timed_out(command, timeout)),
        };
        self.executed.fetch_add(1, Ordering::SeqCst);

        if out.exit_code != 0 {
            warn!("Sandbox command exited with {}: {}", out.exit_code, command);
        }
        if let Some(marker) = unreachable_marker(&out.output) {
            return Err(anyhow!(LanwatchError::NetworkUnreachable {
                cmd: command.to_string(),
                marker: marker.to_string(),
            }));
        }
        Ok(out.output)
    }

    /// Brings the container to `Running`. Caller holds the gate.
    async fn ensure_ready(&self) -> Result<()> {
        let initialized = self.state() != ExecutorState::Uninitialized;
        match self.runtime.is_running().await {
            Ok(true) => {
                self.set_state(ExecutorState::Running);
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => warn!("Could not query sandbox state: {:#}", e),
        }

        if initialized {
            self.set_state(ExecutorState::Restarting);
            info!("Sandbox container is not running, restarting");
            match self.runtime.restart().await {
                Ok(()) => {
                    self.set_state(ExecutorState::Running);
                    return Ok(());
                }
                Err(e) => warn!("Restart failed, recreating container: {:#}", e),
            }
        }

        self.set_state(ExecutorState::Creating);
        if let Err(full) = self.runtime.create(false).await {
            warn!(
                "Tools container creation failed ({:#}); retrying without host networking or capabilities",
                full
            );
            if let Err(reduced) = self.runtime.create(true).await {
                error!("Tools container unavailable: {:#}", reduced);
                self.set_state(ExecutorState::Uninitialized);
                return Err(anyhow!(LanwatchError::SandboxUnavailable(format!(
                    "{:#}; reduced configuration: {:#}",
                    full, reduced
                ))));
            }
        }
        info!("Sandbox container ready");
        self.set_state(ExecutorState::Running);
        Ok(())
    }

    /// Stops and removes the tools container once in-flight work has finished.
    pub async fn shutdown(&self) -> Result<()> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| anyhow!(LanwatchError::SandboxUnavailable("executor closed".into())))?;
        self.runtime.shutdown().await?;
        self.set_state(ExecutorState::Uninitialized);
        info!("Sandbox container removed");
        Ok(())
    }
}

#[async_trait]
impl CommandRunner for SandboxCommandExecutor {
    async fn run(&self, command: &str, timeout: Duration) -> Result<String> {
        self.exec(command, timeout).await
    }

    fn label(&self) -> &'static str {
        "sandbox"
    }
}
