//! # Docker State Queries
//!
//! File: cli/src/common/docker/state.rs
//!
//! ## Overview
//!
//! Read-only queries against container state: existence, inspection and the running
//! check the sandbox executor performs before every exec. Nothing in this module
//! changes container state.
//!
//! ## Architecture
//!
//! - **`container_exists`**: inspect, mapping Docker 404 to `Ok(false)`.
//! - **`inspect_container`**: full `ContainerInspectResponse`, 404 mapped to
//!   `LanwatchError::ContainerNotFound`.
//! - **`container_running`**: `State.Status == running`; a missing container is simply
//!   not running.
//!
use crate::core::error::{LanwatchError, Result};
use anyhow::anyhow;
use bollard::{
    container::InspectContainerOptions,
    models::{ContainerInspectResponse, ContainerStateStatusEnum},
};
use tracing::{debug, error, instrument, warn};

use super::connect::connect_docker;

/// Checks whether a container with this name or ID exists (running or not).
#[instrument(skip(name_or_id), fields(container = %name_or_id))]
pub async fn container_exists(name_or_id: &str) -> Result<bool> {
    let docker = connect_docker().await?;
    debug!("Checking existence for container: {}", name_or_id);

    match docker
        .inspect_container(name_or_id, None::<InspectContainerOptions>)
        .await
    {
        Ok(_) => Ok(true),
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => {
            debug!("Container '{}' does not exist (404).", name_or_id);
            Ok(false)
        }
        Err(e) => {
            error!(
                "Failed to inspect container '{}' during existence check: {:?}",
                name_or_id, e
            );
            Err(anyhow!(LanwatchError::DockerApi { source: e })
                .context(format!("Failed to inspect container '{}'", name_or_id)))
        }
    }
}

/// Returns the raw inspection data for a container.
///
/// # Errors
///
/// * `LanwatchError::ContainerNotFound` - Docker answered 404.
/// * `LanwatchError::DockerApi` - Any other daemon failure.
#[instrument(skip(name_or_id), fields(container = %name_or_id))]
pub async fn inspect_container(name_or_id: &str) -> Result<ContainerInspectResponse> {
    let docker = connect_docker().await?;

    docker
        .inspect_container(name_or_id, None::<InspectContainerOptions>)
        .await
        .map_err(|e| match e {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            } => {
                warn!(
                    "Inspection failed because container '{}' was not found.",
                    name_or_id
                );
                anyhow!(LanwatchError::ContainerNotFound {
                    name: name_or_id.to_string()
                })
            }
            _ => {
                error!("Failed to inspect container '{}': {:?}", name_or_id, e);
                anyhow!(LanwatchError::DockerApi { source: e })
                    .context(format!("Failed to inspect container '{}'", name_or_id))
            }
        })
}

/// `Ok(true)` only when the container exists and its status is `running`.
#[instrument(skip(name_or_id), fields(container = %name_or_id))]
pub async fn container_running(name_or_id: &str) -> Result<bool> {
    match inspect_container(name_or_id).await {
        Ok(details) => {
            let is_running = details
                .state
                .is_some_and(|s| s.status == Some(ContainerStateStatusEnum::RUNNING));
            debug!("Container '{}' running status: {}", name_or_id, is_running);
            Ok(is_running)
        }
        Err(e)
            if e.downcast_ref::<LanwatchError>()
                .is_some_and(|err| matches!(err, LanwatchError::ContainerNotFound { .. })) =>
        {
            debug!("Container '{}' not found, thus not running.", name_or_id);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // needs a Docker daemon
    async fn test_missing_container_is_not_running() {
        let name = "lanwatch-test-definitely-missing";
        assert!(!container_exists(name).await.unwrap());
        assert!(!container_running(name).await.unwrap());

        let err = inspect_container(name).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LanwatchError>(),
            Some(LanwatchError::ContainerNotFound { .. })
        ));
    }
}
