//! # Docker Lifecycle Operations
//!
//! File: cli/src/common/docker/lifecycle.rs
//!
//! ## Overview
//!
//! State-changing container operations used by the sandbox runtime and the
//! `sandbox stop` command: start, stop, restart and remove. Each one is idempotent
//! where Docker allows it (304 "not modified" is success, removing a missing container
//! is success).
//!
//! ## Architecture
//!
//! - **`start_container`**: 304 → already running, 404 → `ContainerNotFound`.
//! - **`stop_container`**: graceful stop with an optional timeout, 304 → already stopped.
//! - **`restart_container`**: used when the tools container is found stopped between execs.
//! - **`remove_container`**: optional force; 404 counts as removed, 409 is reported as a conflict.
//!
use crate::core::error::{LanwatchError, Result};
use anyhow::anyhow;
use bollard::container::{
    RemoveContainerOptions, RestartContainerOptions, StartContainerOptions, StopContainerOptions,
};
use tracing::{error, info, instrument, warn};

use super::connect::connect_docker;

/// Starts a stopped container. Already running counts as success.
#[instrument(skip(name_or_id), fields(container = %name_or_id))]
pub async fn start_container(name_or_id: &str) -> Result<()> {
    let docker = connect_docker().await?;
    info!("Attempting to start container '{}'...", name_or_id);

    match docker
        .start_container(name_or_id, None::<StartContainerOptions<String>>)
        .await
    {
        Ok(_) => {
            info!("Container '{}' started successfully.", name_or_id);
            Ok(())
        }
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 304, ..
        }) => {
            info!("Container '{}' was already started.", name_or_id);
            Ok(())
        }
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => {
            warn!(
                "Start failed because container '{}' was not found.",
                name_or_id
            );
            Err(anyhow!(LanwatchError::ContainerNotFound {
                name: name_or_id.to_string()
            }))
        }
        Err(e) => {
            error!("Failed to start container '{}': {:?}", name_or_id, e);
            Err(anyhow!(LanwatchError::DockerApi { source: e })
                .context(format!("Failed to start container '{}'", name_or_id)))
        }
    }
}

/// Stops a running container, waiting `timeout_secs` (Docker default 10) before SIGKILL.
#[instrument(skip(name_or_id, timeout_secs), fields(container = %name_or_id))]
pub async fn stop_container(name_or_id: &str, timeout_secs: Option<u32>) -> Result<()> {
    let docker = connect_docker().await?;
    let options = timeout_secs.map(|t| StopContainerOptions { t: t as i64 });
    info!(
        "Attempting to stop container '{}' (Timeout: {} seconds)...",
        name_or_id,
        timeout_secs.map_or_else(|| "default (10)".to_string(), |t| t.to_string())
    );

    match docker.stop_container(name_or_id, options).await {
        Ok(_) => {
            info!("Container '{}' stopped successfully.", name_or_id);
            Ok(())
        }
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 304, ..
        }) => {
            info!("Container '{}' was already stopped.", name_or_id);
            Ok(())
        }
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => Err(anyhow!(LanwatchError::ContainerNotFound {
            name: name_or_id.to_string()
        })),
        Err(e) => {
            error!("Failed to stop container '{}': {:?}", name_or_id, e);
            Err(anyhow!(LanwatchError::DockerApi { source: e })
                .context(format!("Failed to stop container '{}'", name_or_id)))
        }
    }
}

/// Restarts a container in place (stop with a short grace period, then start).
#[instrument(skip(name_or_id), fields(container = %name_or_id))]
pub async fn restart_container(name_or_id: &str) -> Result<()> {
    let docker = connect_docker().await?;
    info!("Restarting container '{}'...", name_or_id);

    match docker
        .restart_container(name_or_id, Some(RestartContainerOptions { t: 2 }))
        .await
    {
        Ok(_) => {
            info!("Container '{}' restarted.", name_or_id);
            Ok(())
        }
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => Err(anyhow!(LanwatchError::ContainerNotFound {
            name: name_or_id.to_string()
        })),
        Err(e) => {
            error!("Failed to restart container '{}': {:?}", name_or_id, e);
            Err(anyhow!(LanwatchError::DockerApi { source: e })
                .context(format!("Failed to restart container '{}'", name_or_id)))
        }
    }
}

/// Removes a container. A container that is already gone counts as removed.
///
/// With `force = false` Docker refuses to remove a running container (409); that
/// conflict comes back as `SandboxUnavailable` with the daemon's message.
#[instrument(skip(name_or_id, force), fields(container = %name_or_id))]
pub async fn remove_container(name_or_id: &str, force: bool) -> Result<()> {
    let docker = connect_docker().await?;
    let options = Some(RemoveContainerOptions {
        force,
        v: false,
        link: false,
    });

    match docker.remove_container(name_or_id, options).await {
        Ok(_) => {
            info!("Container '{}' removed (force: {}).", name_or_id, force);
            Ok(())
        }
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => {
            info!("Container '{}' already gone.", name_or_id);
            Ok(())
        }
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message,
        }) => {
            error!("Conflict removing container '{}': {}", name_or_id, message);
            Err(anyhow!(LanwatchError::SandboxUnavailable(format!(
                "conflict removing container '{}': {}",
                name_or_id, message
            ))))
        }
        Err(e) => {
            error!("Failed to remove container '{}': {:?}", name_or_id, e);
            Err(anyhow!(LanwatchError::DockerApi { source: e })
                .context(format!("Failed to remove container '{}'", name_or_id)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // needs a Docker daemon
    async fn test_remove_missing_container_is_ok() {
        assert!(remove_container("lanwatch-test-definitely-missing", true)
            .await
            .is_ok());
    }

    #[tokio::test]
    #[ignore] // needs a Docker daemon
    async fn test_start_missing_container_is_not_found() {
        let err = start_container("lanwatch-test-definitely-missing")
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<LanwatchError>().map(|e| e.kind()),
            Some("container_not_found")
        );
    }
}
