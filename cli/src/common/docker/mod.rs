//! # Docker Module Interface
//!
//! File: cli/src/common/docker/mod.rs
//!
//! ## Overview
//!
//! Everything LanWatch does with Docker goes through this module: keeping the
//! persistent tools container alive, running probe commands in it, and running
//! one-shot scan containers. It wraps `bollard` and maps daemon failures onto
//! `LanwatchError`.
//!
//! ## Architecture
//!
//! - **`connect`**: daemon connection.
//! - **`state`**: existence, inspection and running checks.
//! - **`lifecycle`**: start, stop, restart, remove.
//! - **`operations`**: tools container creation, ephemeral scan containers, cleanup guard.
//! - **`interaction`**: `exec` with captured output.
//!

pub mod connect;
pub mod interaction;
pub mod lifecycle;
pub mod operations;
pub mod state;

pub use interaction::{exec_capture, ExecOutput};
pub use lifecycle::{remove_container, restart_container, stop_container};
pub use operations::{create_tools_container, run_ephemeral, tools_host_config};
pub use state::{container_exists, container_running, inspect_container};
