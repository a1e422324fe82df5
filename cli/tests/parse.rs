//! # Parse Command Integration Tests
//!
//! File: cli/tests/parse.rs
//!
//! `lanwatch parse` over a saved scan, from a file and from stdin.
//!

mod common;

use common::*;
use predicates::prelude::*;

#[test]
fn test_parse_fixture_file() {
    let output = lanwatch_cmd()
        .arg("parse")
        .arg(fixture("acme_scan.txt"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let grouped: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let acme = grouped["Acme"].as_array().unwrap();
    assert_eq!(acme.len(), 1);
    assert_eq!(acme[0]["ip"], "10.0.0.5");
    assert_eq!(acme[0]["mac"], "AA:BB:CC:DD:EE:FF");
    assert_eq!(acme[0]["sshAvailable"], true);
    assert_eq!(acme[0]["macInfo"]["available"], true);

    let unknown = grouped["Unknown"].as_array().unwrap();
    assert_eq!(unknown[0]["ip"], "10.0.0.7");
    assert_eq!(unknown[0]["hostname"], "printer.lan");
    assert_eq!(unknown[0]["sshAvailable"], false);
}

#[test]
fn test_parse_stdin() {
    let raw = std::fs::read_to_string(fixture("acme_scan.txt")).unwrap();
    lanwatch_cmd()
        .arg("parse")
        .write_stdin(raw)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Acme\""));
}

#[test]
fn test_parse_empty_input_is_empty_object() {
    lanwatch_cmd()
        .arg("parse")
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::diff("{}\n"));
}

#[test]
fn test_parse_missing_file_fails() {
    lanwatch_cmd()
        .args(["parse", "/definitely/not/here.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read scan output"));
}
