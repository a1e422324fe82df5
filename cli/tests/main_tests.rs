//! # LanWatch CLI Main Integration Tests
//!
//! File: cli/tests/main_tests.rs
//!
//! Top-level behavior: `--help`, `--version`, unknown subcommands.
//!

mod common;

use common::*;
use predicates::prelude::*;

#[test]
fn test_main_help_flag() {
    lanwatch_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scan"))
        .stdout(predicate::str::contains("sweep"))
        .stdout(predicate::str::contains("watch"));
}

#[test]
fn test_main_version_flag() {
    lanwatch_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unknown_subcommand_fails() {
    lanwatch_cmd()
        .arg("teleport")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_subcommand_help() {
    lanwatch_cmd()
        .args(["scan", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--ports"))
        .stdout(predicate::str::contains("--sandbox"));
}
