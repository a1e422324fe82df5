//! # Monitoring Engine
//!
//! File: cli/src/monitor/mod.rs
//!
//! ## Overview
//!
//! Everything that discovers devices and measures them:
//!
//! - **`model`**: device records and probe results (serialized camelCase).
//! - **`parser`**: nmap text output to device records, line by line.
//! - **`history`**: bounded per-IP, per-metric time series.
//! - **`sandbox`**: the serialized command executor over the tools container.
//! - **`probes`**: latency, connectivity, bandwidth and remote uptime.
//! - **`orchestrator`**: full scans, performance sweeps and watch loops.
//!
//! ## Architecture
//!
//! Dependencies point downwards only: `orchestrator` uses `probes`, `parser` and
//! `history`; `probes` use `sandbox` (in sandbox mode) and `common::process`; everything
//! shares `model`.
//!
pub mod history;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod probes;
pub mod sandbox;
