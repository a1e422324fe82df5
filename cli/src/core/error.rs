//! # LanWatch Error Types
//!
//! File: cli/src/core/error.rs
//!
//! ## Overview
//!
//! This module defines the error taxonomy shared by the monitoring engine and the
//! command handlers. Errors are split by where they originate and by how far they
//! are allowed to travel:
//!
//! - `Validation`: bad IP range, IP address or port list. Raised before anything is spawned.
//! - `SandboxUnavailable`: the persistent tools container could not be created, started or
//!   reconnected (after one retry with a reduced configuration).
//! - `CommandTimeout`: a single sandbox exec or scan exceeded its time budget.
//! - `NetworkUnreachable`: the command ran but its output says the target network could not
//!   be reached (detected from output content, the process may well have exited 0).
//! - `ProbeFailure`: wraps any of the above at the per-IP level during a sweep.
//! - `ScanFailed`: a full scan finished without usable output.
//!
//! Probes convert executor errors into `{alive: false, ...}` shaped results; only
//! orchestrator setup errors reach the top-level caller.
//!
//! ## Architecture
//!
//! - `LanwatchError`: a `thiserror` enum with one variant per failure class.
//! - `Result<T>`: an alias for `anyhow::Result<T>` so call sites can attach context.
//!
//! Callers that need to branch on the failure class downcast:
//!
//! ```rust
//! match executor.exec("ping -c 5 10.0.0.1", timeout).await {
//!     Err(e) if e.downcast_ref::<LanwatchError>().is_some_and(|le| matches!(le, LanwatchError::CommandTimeout { .. })) => {
//!         // treat as offline
//!     }
//!     other => { /* ... */ }
//! }
//! ```
//!
use thiserror::Error;

/// Custom error type for the LanWatch engine.
#[derive(Error, Debug)]
pub enum LanwatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Sandbox container unavailable: {0}")]
    SandboxUnavailable(String),

    #[error("Command timed out after {timeout_ms} ms: {cmd}")]
    CommandTimeout { cmd: String, timeout_ms: u64 },

    #[error("Network unreachable while running '{cmd}': {marker}")]
    NetworkUnreachable { cmd: String, marker: String },

    #[error("Probe failed for {ip}: {message}")]
    ProbeFailure { ip: String, message: String },

    #[error("Scan failed: {0}")]
    ScanFailed(String),

    #[error("Container '{name}' not found")]
    ContainerNotFound { name: String },

    #[error("Docker API interaction failed: {source}")]
    DockerApi {
        #[from]
        source: bollard::errors::Error,
    },

    #[error("External command failed: {cmd}, Status: {status}, Output:\n{output}")]
    ExternalCommand {
        cmd: String,
        status: String,
        output: String,
    },
}

impl LanwatchError {
    /// Short machine-friendly name of the failure class, used in progress events.
    pub fn kind(&self) -> &'static str {
        match self {
            LanwatchError::Config(_) => "config",
            LanwatchError::Validation(_) => "validation",
            LanwatchError::SandboxUnavailable(_) => "sandbox_unavailable",
            LanwatchError::CommandTimeout { .. } => "command_timeout",
            LanwatchError::NetworkUnreachable { .. } => "network_unreachable",
            LanwatchError::ProbeFailure { .. } => "probe_failure",
            LanwatchError::ScanFailed(_) => "scan_failed",
            LanwatchError::ContainerNotFound { .. } => "container_not_found",
            LanwatchError::DockerApi { .. } => "docker_api",
            LanwatchError::ExternalCommand { .. } => "external_command",
        }
    }
}

/// Type alias for Result using anyhow::Error for context-rich propagation.
pub type Result<T> = anyhow::Result<T>;

/// Returns the `LanwatchError` carried by an `anyhow::Error`, if any.
pub fn classify(err: &anyhow::Error) -> Option<&LanwatchError> {
    err.downcast_ref::<LanwatchError>()
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn test_error_display() {
        let validation = LanwatchError::Validation("empty target".to_string());
        assert_eq!(validation.to_string(), "Invalid input: empty target");

        let timeout = LanwatchError::CommandTimeout {
            cmd: "ping -c 5 10.0.0.1".into(),
            timeout_ms: 1500,
        };
        assert_eq!(
            timeout.to_string(),
            "Command timed out after 1500 ms: ping -c 5 10.0.0.1"
        );

        let probe = LanwatchError::ProbeFailure {
            ip: "10.0.0.9".into(),
            message: "boom".into(),
        };
        assert_eq!(probe.to_string(), "Probe failed for 10.0.0.9: boom");
    }

    #[test]
    fn test_classify_survives_context() {
        let err = Err::<(), _>(anyhow!(LanwatchError::NetworkUnreachable {
            cmd: "ping".into(),
            marker: "Network is unreachable".into(),
        }))
        .context("latency probe")
        .unwrap_err();

        let classified = classify(&err).expect("should downcast through context");
        assert_eq!(classified.kind(), "network_unreachable");
    }

    #[test]
    fn test_classify_plain_error() {
        let err = anyhow!("some other failure");
        assert!(classify(&err).is_none());
    }
}
