//! # Scan and Sweep Integration Tests
//!
//! File: cli/tests/scan.rs
//!
//! Input validation happens before anything is spawned, so these run without nmap or
//! Docker. The configuration is pinned to an empty temp file.
//!

mod common;

use common::*;
use predicates::prelude::*;

#[test]
fn test_scan_rejects_bad_port_list() {
    let (_dir, config) = temp_config("");
    lanwatch_cmd()
        .arg("--config")
        .arg(&config)
        .args(["scan", "10.0.0.1", "-p", "22,http"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid port list"));
}

#[test]
fn test_scan_rejects_injected_target() {
    let (_dir, config) = temp_config("");
    lanwatch_cmd()
        .arg("--config")
        .arg(&config)
        .args(["scan", "10.0.0.1;-oN/tmp/pwned"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid scan target"));
}

#[test]
fn test_scan_timing_out_of_range_is_usage_error() {
    lanwatch_cmd()
        .args(["scan", "10.0.0.1", "-T", "9"])
        .assert()
        .code(2);
}

#[test]
fn test_scan_rejects_invalid_config() {
    let (_dir, config) = temp_config("[scan]\ntiming_template = 7\n");
    lanwatch_cmd()
        .arg("--config")
        .arg(&config)
        .args(["scan", "10.0.0.1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"));
}

#[test]
fn test_sweep_reports_invalid_ip_and_continues() {
    let (_dir, config) = temp_config("");
    lanwatch_cmd()
        .arg("--config")
        .arg(&config)
        .args(["sweep", "not-an-ip"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""type":"error""#))
        .stdout(predicate::str::contains(r#""ip":"not-an-ip""#))
        .stdout(predicate::str::contains(r#""kind":"sweep""#));
}

#[test]
#[ignore = "requires nmap on PATH"]
fn test_scan_localhost() {
    let (_dir, config) = temp_config("");
    lanwatch_cmd()
        .arg("--config")
        .arg(&config)
        .args(["scan", "127.0.0.1", "-p", "1-1024", "--timeout", "120"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""kind":"devices""#));
}
