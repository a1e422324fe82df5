//! # Scan Command
//!
//! File: cli/src/commands/scan.rs
//!
//! ## Overview
//!
//! `lanwatch scan <TARGET>` runs one full nmap scan and prints progress events as JSON
//! lines on stdout. The last two lines are the SSH-capable subset (`sshDevices`) and all
//! devices found up, grouped by vendor (`devices`).
//!
//! Ctrl-C cancels the scan. The nmap process is killed (host mode) or the scan
//! container force-removed (sandbox mode).
//!
//! ## Usage
//!
//! ```bash
//! lanwatch scan 192.168.1.0/24
//! lanwatch scan 10.0.0.1-50 -p 22,80,443 --service-version -T3
//! lanwatch scan 192.168.1.0/24 --sandbox --raw   # include raw nmap output events
//! ```
//!
use super::{build_engine, load_config};
use crate::common::progress::JsonLinesSink;
use crate::core::error::Result;
use crate::monitor::orchestrator::ScanOptions;
use anyhow::bail;
use clap::Parser;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Time given to drop guards to remove an ephemeral scan container after Ctrl-C.
const CANCEL_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(
    about = "Discover devices in a target range with nmap",
    long_about = "Scans TARGET (IP, CIDR block, octet range like 192.168.1.1-50, or hostname;\n\
                  comma-separated for several) and prints progress and results as JSON lines."
)]
pub struct ScanArgs {
    /// Target range, e.g. 192.168.1.0/24.
    target: String,
    /// Port list, e.g. 22,80,8000-8100. Defaults to `scan.default_ports` or nmap's top ports.
    #[arg(short, long)]
    ports: Option<String>,
    /// Probe open ports for service/version info (-sV).
    #[arg(short = 's', long)]
    service_version: bool,
    /// Enable OS detection (-O; needs root or NET_RAW).
    #[arg(short = 'O', long)]
    os_detection: bool,
    /// Host discovery only, no port scan (-sn).
    #[arg(long, conflicts_with_all = ["ports", "service_version", "os_detection"])]
    ping_only: bool,
    /// nmap timing template.
    #[arg(short = 'T', long, value_parser = clap::value_parser!(u8).range(0..=5))]
    timing: Option<u8>,
    /// Run nmap in a throwaway container from the tools image.
    #[arg(long)]
    sandbox: bool,
    /// Overall scan timeout in seconds. Defaults to `scan.timeout_secs`.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    /// Also print raw nmap output as `output` events.
    #[arg(long)]
    raw: bool,
}

pub async fn handle_scan(args: ScanArgs, config_path: Option<&Path>) -> Result<()> {
    let cfg = load_config(config_path)?;
    let use_sandbox = args.sandbox || cfg.probes.use_sandbox;
    let engine = build_engine(&cfg, use_sandbox)?;

    let opts = ScanOptions {
        ports: args.ports,
        service_version: args.service_version,
        os_detection: args.os_detection,
        port_scan: !args.ping_only,
        timing: args.timing,
        use_sandbox,
        timeout: args.timeout.map(Duration::from_secs),
    };
    let sink = JsonLinesSink::new(std::io::stdout(), args.raw);

    tokio::select! {
        result = engine.orchestrator.full_scan(&args.target, &opts, &sink) => {
            let grouped = result?;
            info!(
                "Scan complete: {} device(s) in {} vendor group(s)",
                grouped.values().map(Vec::len).sum::<usize>(),
                grouped.len()
            );
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling scan");
            tokio::time::sleep(CANCEL_GRACE).await;
            bail!("scan of {} interrupted", args.target)
        }
    }
}
