//! # Process Execution Utilities
//!
//! File: cli/src/common/process.rs
//!
//! ## Overview
//!
//! Host-side process execution for the probes and the host scan path:
//!
//! - **`CommandRunner`**: the seam every probe runs its shell commands through. It is
//!   implemented here by `HostRunner` (local `sh -c`) and in `monitor::sandbox` by the
//!   sandbox executor, so a probe never knows where its command actually ran.
//! - **`run_captured`**: spawn a prepared `tokio::process::Command` under a timeout and
//!   collect combined output. Used for argv-style invocations (ssh) that must not go
//!   through a shell.
//! - **`unreachable_marker`**: output inspection shared by both runners; some tools exit
//!   0 even when the network was unreachable, so failure is detected from content.
//!
//! ## Architecture
//!
//! Children are spawned with `kill_on_drop(true)`: when a probe future is dropped (timeout
//! or cancelled sweep) the child process is killed with it.
//!
use crate::core::error::{LanwatchError, Result};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Output substrings that mean the target network could not be reached.
pub const UNREACHABLE_MARKERS: &[&str] = &[
    "Network is unreachable",
    "unknown host",
    "Name or service not known",
    "No route to host",
];

/// First unreachable marker found in `output`, if any.
pub fn unreachable_marker(output: &str) -> Option<&'static str> {
    UNREACHABLE_MARKERS
        .iter()
        .copied()
        .find(|marker| output.contains(marker))
}

/// Quotes `value` as one POSIX shell word.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Runs a shell-level command and returns its combined stdout and stderr.
///
/// Implementations enforce `timeout` themselves and report an exceeded budget as
/// `LanwatchError::CommandTimeout`. A non-zero exit status is *not* an error: probes
/// such as `ping` exit non-zero for an offline host and still produce parseable output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> Result<String>;

    /// Short label for logs (`host`, `sandbox`).
    fn label(&self) -> &'static str;
}

/// Runs commands through the host shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostRunner;

#[async_trait]
impl CommandRunner for HostRunner {
    async fn run(&self, command: &str, timeout: Duration) -> Result<String> {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        };
        let captured = run_captured(&mut cmd, command, timeout).await?;
        if let Some(marker) = unreachable_marker(&captured.output) {
            return Err(anyhow!(LanwatchError::NetworkUnreachable {
                cmd: command.to_string(),
                marker: marker.to_string(),
            }));
        }
        Ok(captured.output)
    }

    fn label(&self) -> &'static str {
        "host"
    }
}

/// Combined output and exit status of a finished child.
#[derive(Debug, Clone)]
pub struct Captured {
    pub output: String,
    /// `None` when the child was terminated by a signal.
    pub code: Option<i32>,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Spawns `cmd`, waits for it under `timeout` and returns stdout followed by stderr.
///
/// `label` is what appears in logs and errors; pass something that does not leak secrets.
///
/// # Errors
///
/// * `LanwatchError::CommandTimeout` - the child did not finish in time (it is killed).
/// * spawn failures (binary missing, permissions) with context naming `label`.
pub async fn run_captured(cmd: &mut Command, label: &str, timeout: Duration) -> Result<Captured> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Running '{}' (timeout {:?})", label, timeout);
    let child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn '{}'", label))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.with_context(|| format!("Failed waiting for '{}'", label))?,
        Err(_) => {
            warn!("'{}' exceeded {:?}, killed", label, timeout);
            return Err(anyhow!(LanwatchError::CommandTimeout {
                cmd: label.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }));
        }
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    let code = output.status.code();
    if code != Some(0) {
        debug!("'{}' exited with {:?}", label, code);
    }
    Ok(Captured {
        output: combined,
        code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::classify;

    #[test]
    fn test_unreachable_marker_detection() {
        assert_eq!(
            unreachable_marker("connect: Network is unreachable"),
            Some("Network is unreachable")
        );
        assert_eq!(
            unreachable_marker("ping: foo: Name or service not known"),
            Some("Name or service not known")
        );
        assert_eq!(unreachable_marker("64 bytes from 10.0.0.1"), None);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("http://x/10MB.zip"), "'http://x/10MB.zip'");
        assert_eq!(shell_quote("a'b"), "'a'\\''b'");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_host_runner_combines_streams() {
        let out = HostRunner
            .run("echo out; echo err 1>&2", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.contains("out"));
        assert!(out.contains("err"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_host_runner_nonzero_exit_is_not_error() {
        let out = HostRunner
            .run("echo partial; exit 3", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.trim(), "partial");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_host_runner_timeout() {
        let err = HostRunner
            .run("sleep 5", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(classify(&err).map(|e| e.kind()), Some("command_timeout"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_host_runner_reports_unreachable() {
        let err = HostRunner
            .run("echo 'connect: Network is unreachable'", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(classify(&err).map(|e| e.kind()), Some("network_unreachable"));
    }
}
