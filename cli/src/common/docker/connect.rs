//! # Docker Connection Helper
//!
//! File: cli/src/common/docker/connect.rs
//!
//! ## Overview
//!
//! Single entry point for obtaining a `bollard::Docker` client. Every other module in
//! `common::docker` goes through `connect_docker` so connection failures are reported
//! the same way everywhere (`LanwatchError::DockerApi` with a hint about the daemon).
//!
//! The client is cheap to construct; callers connect per operation instead of caching
//! a handle, which keeps the sandbox runtime free of shared client state.
//!
use crate::core::error::{LanwatchError, Result};
use anyhow::{anyhow, Context};
use bollard::Docker;
use tracing::instrument;

/// Connects to the local Docker daemon (unix socket or named pipe) with bollard's defaults.
///
/// # Errors
///
/// `LanwatchError::DockerApi` when the daemon is not reachable.
#[instrument]
pub async fn connect_docker() -> Result<Docker> {
    Docker::connect_with_local_defaults()
        .map_err(|e| anyhow!(LanwatchError::DockerApi { source: e }))
        .context("Failed to connect to Docker daemon. Is it running and accessible?")
}
