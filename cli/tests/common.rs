//! # LanWatch CLI Integration Test Helpers
//!
//! File: cli/tests/common.rs
//!
//! Shared helpers for the integration tests in `cli/tests/`. Each test file declares
//! `mod common;` and drives the compiled `lanwatch` binary through `assert_cmd`.
//!

// Different test files use different helpers.
#![allow(dead_code)]

pub use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::TempDir;

/// `assert_cmd::Command` for the `lanwatch` binary under test.
pub fn lanwatch_cmd() -> Command {
    Command::cargo_bin("lanwatch").expect("Failed to find lanwatch binary for testing")
}

/// Path of a file under `tests/fixtures/`.
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Temp dir holding `config.toml` with `contents`, so tests never pick up the
/// developer's own configuration.
pub fn temp_config(contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).expect("Failed to write temp config");
    (dir, path)
}
