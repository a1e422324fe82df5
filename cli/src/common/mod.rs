//! # Shared Infrastructure (`common`)
//!
//! File: cli/src/common/mod.rs
//!
//! ## Overview
//!
//! Cross-cutting utilities used by the monitoring engine and the command layer.
//!
//! ## Architecture
//!
//! - **`docker`**: bollard wrappers for the tools container and ephemeral scan containers.
//! - **`process`**: local command execution with timeouts, the `CommandRunner` seam.
//! - **`progress`**: progress events and the sinks that deliver them.
//!

/// Docker daemon access (containers, exec, logs).
pub mod docker;
/// Local process execution with timeouts.
pub mod process;
/// Progress events emitted by scans and sweeps.
pub mod progress;
