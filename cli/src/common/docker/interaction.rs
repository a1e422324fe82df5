//! # Docker Exec Interaction
//!
//! File: cli/src/common/docker/interaction.rs
//!
//! ## Overview
//!
//! Non-interactive command execution inside a running container, capturing output
//! instead of relaying it to the terminal. This is the transport under the sandbox
//! executor: each probe command becomes one Docker `exec` instance.
//!
//! ## Architecture
//!
//! `exec_capture` creates an exec with stdout and stderr attached (no stdin, no TTY),
//! drains the multiplexed output stream into one string, then inspects the exec for its
//! exit code. The exec has no deadline of its own; the sandbox executor puts the command
//! under `timeout` so it is killed inside the container.
//!
use crate::core::error::{LanwatchError, Result};
use anyhow::anyhow;
use bollard::{
    container::LogOutput,
    exec::{CreateExecOptions, StartExecResults},
};
use futures_util::StreamExt;
use tracing::{debug, instrument, warn};

use super::connect::connect_docker;

/// Captured result of one exec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// stdout and stderr interleaved as the daemon delivered them.
    pub output: String,
    /// `-1` when Docker did not report one.
    pub exit_code: i64,
}

/// Runs `cmd` inside `name_or_id` and returns combined output plus exit code.
///
/// # Errors
///
/// * `LanwatchError::ContainerNotFound` - the container does not exist.
/// * `LanwatchError::DockerApi` - creating, starting or inspecting the exec failed.
#[instrument(skip(name_or_id, cmd), fields(container = %name_or_id))]
pub async fn exec_capture(name_or_id: &str, cmd: &[String]) -> Result<ExecOutput> {
    let docker = connect_docker().await?;

    let exec = docker
        .create_exec(
            name_or_id,
            CreateExecOptions {
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                attach_stdin: Some(false),
                tty: Some(false),
                cmd: Some(cmd.to_vec()),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| match e {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            } => anyhow!(LanwatchError::ContainerNotFound {
                name: name_or_id.to_string()
            }),
            _ => anyhow!(LanwatchError::DockerApi { source: e }).context(format!(
                "Failed to create exec instance in container '{}'",
                name_or_id
            )),
        })?;
    debug!("Created exec instance {}", exec.id);

    let started = docker
        .start_exec(&exec.id, None)
        .await
        .map_err(|e| {
            anyhow!(LanwatchError::DockerApi { source: e }).context("Failed to start exec instance")
        })?;

    let mut output = String::new();
    if let StartExecResults::Attached {
        output: mut stream, ..
    } = started
    {
        while let Some(item) = stream.next().await {
            match item {
                Ok(LogOutput::StdOut { message })
                | Ok(LogOutput::StdErr { message })
                | Ok(LogOutput::Console { message }) => {
                    output.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(LogOutput::StdIn { .. }) => {}
                Err(e) => {
                    warn!("Error receiving output from exec stream: {}", e);
                    break;
                }
            }
        }
    }

    let inspect = docker.inspect_exec(&exec.id).await.map_err(|e| {
        anyhow!(LanwatchError::DockerApi { source: e }).context(format!(
            "Failed to inspect exec instance '{}' after execution",
            exec.id
        ))
    })?;
    let exit_code = inspect.exit_code.unwrap_or(-1);
    debug!("Exec {} finished with exit code {}", exec.id, exit_code);

    Ok(ExecOutput { output, exit_code })
}
