//! # Docker Container Operations
//!
//! File: cli/src/common/docker/operations.rs
//!
//! ## Overview
//!
//! Container creation for the two ways the network tools image is used:
//!
//! - **Tools container** (`create_tools_container`): long-lived, named, kept alive by an
//!   idle command. The sandbox executor runs every probe command inside it with `exec`.
//! - **Ephemeral scan container** (`run_ephemeral`): one container per full scan whose
//!   command *is* the scan. Its logs are streamed while it runs, then it is waited on and
//!   removed. A `ContainerGuard` force-removes it if the caller is dropped mid-scan.
//!
//! ## Architecture
//!
//! Both paths share `tools_host_config`, which maps the `[sandbox]` config section onto a
//! bollard `HostConfig`. The reduced variant (no host networking, no added capabilities)
//! is what the executor retries with when the full configuration is refused, e.g. on
//! Docker Desktop hosts where `network_mode = host` is unsupported.
//!
use crate::core::{
    config::SandboxConfig,
    error::{LanwatchError, Result},
};
use anyhow::{anyhow, Context};
use bollard::{
    container::{
        Config as ContainerConfig, CreateContainerOptions, LogsOptions, StartContainerOptions,
        WaitContainerOptions,
    },
    models::HostConfig,
};
use futures_util::StreamExt;
use tracing::{debug, error, info, instrument, warn};

use super::connect::connect_docker;
use super::lifecycle::{remove_container, start_container};
use super::state::container_exists;

/// Host configuration for containers started from the tools image.
pub fn tools_host_config(cfg: &SandboxConfig, reduced: bool) -> HostConfig {
    if reduced {
        return HostConfig::default();
    }
    HostConfig {
        network_mode: cfg.host_network.then(|| "host".to_string()),
        cap_add: if cfg.cap_add.is_empty() {
            None
        } else {
            Some(cfg.cap_add.clone())
        },
        ..Default::default()
    }
}

/// Creates and starts the persistent tools container named in `cfg`.
///
/// A leftover container with the same name (stopped, or created with other settings) is
/// removed first so the requested host configuration always applies.
///
/// # Errors
///
/// `DockerApi` when the image is missing or the daemon rejects the configuration.
#[instrument(skip(cfg), fields(container = %cfg.container_name, reduced = reduced))]
pub async fn create_tools_container(cfg: &SandboxConfig, reduced: bool) -> Result<()> {
    let docker = connect_docker().await?;
    let name = cfg.container_name.as_str();

    if container_exists(name).await? {
        debug!("Removing stale tools container '{}' before create.", name);
        remove_container(name, true).await?;
    }

    let config = ContainerConfig {
        image: Some(cfg.image.clone()),
        cmd: if cfg.keepalive_command.is_empty() {
            None
        } else {
            Some(cfg.keepalive_command.clone())
        },
        host_config: Some(tools_host_config(cfg, reduced)),
        tty: Some(false),
        ..Default::default()
    };

    info!(
        "Creating tools container '{}' from image '{}' (reduced: {})",
        name, cfg.image, reduced
    );
    docker
        .create_container(
            Some(CreateContainerOptions {
                name: name.to_string(),
                platform: None,
            }),
            config,
        )
        .await
        .map_err(|e| anyhow!(LanwatchError::DockerApi { source: e }))
        .with_context(|| format!("Failed to create container '{}'", name))?;

    start_container(name)
        .await
        .with_context(|| format!("Failed to start container '{}'", name))?;

    info!("Tools container '{}' is up.", name);
    Ok(())
}

/// Output of a finished ephemeral container.
#[derive(Debug, Clone)]
pub struct EphemeralOutcome {
    /// Combined stdout and stderr, in arrival order.
    pub output: String,
    pub exit_code: i64,
}

/// Force-removes a container on drop unless disarmed.
///
/// Removal runs as a detached task on the current tokio runtime, so dropping the guard
/// never blocks.
pub struct ContainerGuard {
    name: String,
    armed: bool,
}

impl ContainerGuard {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            armed: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The container was cleaned up normally; nothing left to do on drop.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let name = std::mem::take(&mut self.name);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Scan abandoned, force-removing container '{}'", name);
                handle.spawn(async move {
                    if let Err(e) = remove_container(&name, true).await {
                        warn!("Cleanup of container '{}' failed: {:#}", name, e);
                    }
                });
            }
            Err(_) => warn!(
                "No runtime available to remove container '{}'; remove it manually.",
                name
            ),
        }
    }
}

/// Runs `cmd` in a fresh container from `image` and returns its output once it exits.
///
/// Every log chunk is handed to `on_chunk` as it arrives. The container is removed
/// afterwards regardless of exit status.
///
/// # Errors
///
/// * `SandboxUnavailable` - the container could not be created or started. Nothing has
///   reached `on_chunk` yet.
/// * `DockerApi` - waiting on the container failed after its output was streamed.
#[instrument(skip(cmd, host_config, on_chunk), fields(image = %image))]
pub async fn run_ephemeral(
    image: &str,
    cmd: Vec<String>,
    host_config: HostConfig,
    on_chunk: &mut (dyn FnMut(&str) + Send),
) -> Result<EphemeralOutcome> {
    let docker = connect_docker().await?;
    let name = format!("lanwatch-scan-{:08x}", rand::random::<u32>());

    let config = ContainerConfig {
        image: Some(image.to_string()),
        cmd: Some(cmd),
        host_config: Some(host_config),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        ..Default::default()
    };

    docker
        .create_container(
            Some(CreateContainerOptions {
                name: name.clone(),
                platform: None,
            }),
            config,
        )
        .await
        .map_err(|e| {
            anyhow!(LanwatchError::SandboxUnavailable(format!(
                "failed to create scan container from '{}': {}",
                image, e
            )))
        })?;
    let guard = ContainerGuard::new(&name);

    docker
        .start_container(&name, None::<StartContainerOptions<String>>)
        .await
        .map_err(|e| {
            anyhow!(LanwatchError::SandboxUnavailable(format!(
                "failed to start scan container '{}': {}",
                name, e
            )))
        })?;
    info!("Scan container '{}' started.", name);

    let mut output = String::new();
    let mut logs = docker.logs(
        &name,
        Some(LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        }),
    );
    while let Some(chunk) = logs.next().await {
        match chunk {
            Ok(log) => {
                let text = String::from_utf8_lossy(&log.into_bytes()).into_owned();
                on_chunk(&text);
                output.push_str(&text);
            }
            Err(e) => {
                warn!("Log stream for '{}' ended with error: {}", name, e);
                break;
            }
        }
    }

    let mut exit_code = 0;
    let mut wait = docker.wait_container(
        &name,
        Some(WaitContainerOptions {
            condition: "not-running",
        }),
    );
    while let Some(result) = wait.next().await {
        match result {
            Ok(response) => exit_code = response.status_code,
            // bollard reports non-zero exits as an error carrying the code
            Err(bollard::errors::Error::DockerContainerWaitError { code, .. }) => exit_code = code,
            Err(e) => {
                error!("Waiting on scan container '{}' failed: {:?}", name, e);
                return Err(anyhow!(LanwatchError::DockerApi { source: e })
                    .context(format!("Failed to wait for container '{}'", name)));
            }
        }
    }
    debug!("Scan container '{}' exited with {}", name, exit_code);

    // Output is already delivered; a cleanup failure is not a scan failure.
    if let Err(e) = remove_container(guard.name(), true).await {
        warn!("Failed to remove scan container '{}': {:#}", guard.name(), e);
    }
    guard.disarm();

    Ok(EphemeralOutcome { output, exit_code })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tools_host_config_full() {
        let cfg = SandboxConfig::default();
        let host = tools_host_config(&cfg, false);
        assert_eq!(host.network_mode.as_deref(), Some("host"));
        assert_eq!(
            host.cap_add,
            Some(vec!["NET_RAW".to_string(), "NET_ADMIN".to_string()])
        );
    }

    #[test]
    fn test_tools_host_config_reduced_drops_privileges() {
        let cfg = SandboxConfig::default();
        let host = tools_host_config(&cfg, true);
        assert!(host.network_mode.is_none());
        assert!(host.cap_add.is_none());
    }

    #[test]
    fn test_tools_host_config_respects_bridge_setting() {
        let cfg = SandboxConfig {
            host_network: false,
            cap_add: Vec::new(),
            ..Default::default()
        };
        let host = tools_host_config(&cfg, false);
        assert!(host.network_mode.is_none());
        assert!(host.cap_add.is_none());
    }

    #[tokio::test]
    async fn test_guard_disarm_skips_cleanup() {
        // Disarmed guards must not spawn anything; dropping one is a no-op.
        let guard = ContainerGuard::new("lanwatch-scan-test");
        assert_eq!(guard.name(), "lanwatch-scan-test");
        guard.disarm();
    }
}
