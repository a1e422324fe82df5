//! # Scan Orchestrator
//!
//! File: cli/src/monitor/orchestrator.rs
//!
//! ## Overview
//!
//! Top-level engine operations:
//!
//! - **`full_scan`**: validate a target range and port list, run nmap (on the host, or in
//!   a throwaway container from the tools image), stream its output to the progress
//!   sink, parse it, record every device in history, and return devices grouped by vendor.
//! - **`performance_sweep`**: for each IP, measure latency; when the host answers, measure
//!   bandwidth, remote uptime and connectivity concurrently. Each IP produces a
//!   `partialUpdate` event; the sweep ends with one aggregate `data` event.
//! - **`watch`**: repeated sweeps over the same history so uptime percentages build up.
//!
//! ## Architecture
//!
//! ```text
//!  target ──sanitize/validate──▶ nmap argv ──ScanRunner──▶ raw text ──parser──▶ GroupedDevices
//!                                                 │                                │
//!                                          ProgressSink(output)            HistoryStore.scanResults
//!
//!  ips ──buffered(concurrency)──▶ ProbeSuite ──▶ HistoryStore.{latency,bandwidth,uptime}
//!                                     │
//!                              ProgressSink(partialUpdate, error, data)
//! ```
//!
//! `ScanRunner` is the seam between orchestration and process/container handling:
//! `HostScanRunner` spawns nmap with `kill_on_drop`, `SandboxScanRunner` runs it in an
//! ephemeral container guarded by a force-remove on drop. Either way, dropping a
//! `full_scan` future cleans up after itself and leaves the sandbox executor queue alone.
//!
use crate::common::docker;
use crate::common::progress::{DataPayload, ProgressEvent, ProgressSink};
use crate::core::config::{SandboxConfig, ScanConfig};
use crate::core::error::{LanwatchError, Result};
use crate::monitor::history::{HistoryStore, Metric, UptimeSample};
use crate::monitor::model::{
    DeviceMetrics, DeviceRecord, GroupedDevices, IpMetric, Reachability, SshCredentials,
    SweepSummary,
};
use crate::monitor::parser;
use crate::monitor::probes::ProbeSuite;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use regex::Regex;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};

// --- Input validation ---

fn validation(message: String) -> anyhow::Error {
    anyhow!(LanwatchError::Validation(message))
}

fn ports_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(-\d+)?(,\d+(-\d+)?)*$").expect("valid ports regex"))
}

fn hostname_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$")
            .expect("valid hostname regex")
    })
}

/// Checks an nmap port list such as `22,80,8000-8100`. Every port must be in 1..=65535
/// and ranges must be ascending.
pub fn validate_ports(ports: &str) -> Result<()> {
    if !ports_pattern().is_match(ports) {
        return Err(validation(format!("invalid port list '{}'", ports)));
    }
    for part in ports.split(',') {
        let mut bounds = part.splitn(2, '-');
        let low = parse_port(bounds.next().unwrap_or_default(), ports)?;
        if let Some(high) = bounds.next() {
            let high = parse_port(high, ports)?;
            if high < low {
                return Err(validation(format!(
                    "port range '{}' is descending in '{}'",
                    part, ports
                )));
            }
        }
    }
    Ok(())
}

fn parse_port(value: &str, whole: &str) -> Result<u16> {
    match value.parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => Ok(port as u16),
        _ => Err(validation(format!(
            "port '{}' out of range 1-65535 in '{}'",
            value, whole
        ))),
    }
}

/// Strips everything except `[A-Za-z0-9-.,/]`. Whitespace separates targets, like commas.
pub fn sanitize_range(range: &str) -> String {
    range
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(",")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | ',' | '/'))
        .collect()
}

fn is_octet_range(token: &str) -> bool {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 4 || !token.contains('-') {
        return false;
    }
    parts.iter().all(|part| {
        let mut bounds = part.splitn(2, '-');
        let low = bounds.next().and_then(|v| v.parse::<u8>().ok());
        match (low, bounds.next()) {
            (Some(_), None) => true,
            (Some(low), Some(high)) => high.parse::<u8>().is_ok_and(|high| high >= low),
            _ => false,
        }
    })
}

fn is_cidr(token: &str) -> bool {
    match token.split_once('/') {
        Some((addr, bits)) => {
            addr.parse::<Ipv4Addr>().is_ok() && bits.parse::<u8>().is_ok_and(|b| b <= 32)
        }
        None => false,
    }
}

fn is_hostname(token: &str) -> bool {
    // an all-numeric last label would be a malformed address, not a name
    token.len() <= 253
        && hostname_pattern().is_match(token)
        && token
            .rsplit('.')
            .next()
            .is_some_and(|tld| tld.chars().any(|c| c.is_ascii_alphabetic()))
}

/// Sanitizes `range` and splits it into nmap targets. Each comma-separated token must
/// be an IPv4 address, a CIDR block, an octet range (`192.168.1.1-50`) or a hostname.
pub fn parse_targets(range: &str) -> Result<Vec<String>> {
    let sanitized = sanitize_range(range);
    let targets: Vec<String> = sanitized
        .split(',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if targets.is_empty() {
        return Err(validation(format!("no scan target in '{}'", range)));
    }
    for target in &targets {
        let valid = target.parse::<Ipv4Addr>().is_ok()
            || is_cidr(target)
            || is_octet_range(target)
            || is_hostname(target);
        if !valid {
            return Err(validation(format!("invalid scan target '{}'", target)));
        }
    }
    Ok(targets)
}

// --- Scan execution ---

/// What a full scan should do. `None` fields fall back to `[scan]` config.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub ports: Option<String>,
    pub service_version: bool,
    pub os_detection: bool,
    /// `false` runs host discovery only (`-sn`).
    pub port_scan: bool,
    pub timing: Option<u8>,
    pub use_sandbox: bool,
    pub timeout: Option<Duration>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            ports: None,
            service_version: false,
            os_detection: false,
            port_scan: true,
            timing: None,
            use_sandbox: false,
            timeout: None,
        }
    }
}

/// nmap argv (without the program name) for `targets`.
pub fn build_nmap_args(targets: &[String], opts: &ScanOptions, cfg: &ScanConfig) -> Vec<String> {
    let mut args = Vec::new();
    if opts.port_scan {
        if let Some(ports) = opts.ports.as_ref().or(cfg.default_ports.as_ref()) {
            args.push("-p".to_string());
            args.push(ports.clone());
        }
        if opts.service_version {
            args.push("-sV".to_string());
        }
        if opts.os_detection {
            args.push("-O".to_string());
        }
    } else {
        args.push("-sn".to_string());
    }
    args.push(format!("-T{}", opts.timing.unwrap_or(cfg.timing_template)));
    args.push("--max-retries".to_string());
    args.push(cfg.max_retries.to_string());
    args.push("--host-timeout".to_string());
    args.push(cfg.host_timeout.clone());
    if opts.port_scan {
        args.push("--script".to_string());
        args.push("ssh-auth-methods,ssh-hostkey".to_string());
    }
    args.extend(targets.iter().cloned());
    args
}

/// Runs nmap with `args` and returns its text output. Chunks are passed to `on_chunk`
/// as they arrive.
#[async_trait]
pub trait ScanRunner: Send + Sync {
    async fn run(
        &self,
        args: &[String],
        timeout: Duration,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String>;
}

/// nmap on the host.
pub struct HostScanRunner {
    nmap_path: String,
}

impl HostScanRunner {
    pub fn new(nmap_path: impl Into<String>) -> Self {
        Self {
            nmap_path: nmap_path.into(),
        }
    }
}

#[async_trait]
impl ScanRunner for HostScanRunner {
    #[instrument(skip(self, on_chunk), fields(nmap = %self.nmap_path))]
    async fn run(
        &self,
        args: &[String],
        timeout: Duration,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String> {
        let label = format!("{} {}", self.nmap_path, args.join(" "));
        let mut child = Command::new(&self.nmap_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'. Is nmap installed?", self.nmap_path))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("nmap stdout was not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("nmap stderr was not captured"))?;

        let work = async {
            let stderr_task = tokio::spawn(async move {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text).await;
                text
            });
            let mut lines = BufReader::new(stdout).lines();
            let mut output = String::new();
            while let Some(line) = lines.next_line().await? {
                let chunk = format!("{}\n", line);
                on_chunk(&chunk);
                output.push_str(&chunk);
            }
            let status = child.wait().await?;
            let errors = stderr_task.await.unwrap_or_default();
            Ok::<_, anyhow::Error>((output, status, errors))
        };

        let (output, status, errors) = match tokio::time::timeout(timeout, work).await {
            Ok(result) => result.with_context(|| format!("Failed running '{}'", label))?,
            Err(_) => {
                warn!("Scan exceeded {:?}, killing nmap", timeout);
                return Err(anyhow!(LanwatchError::CommandTimeout {
                    cmd: label,
                    timeout_ms: timeout.as_millis() as u64,
                }));
            }
        };
        if !status.success() {
            warn!("nmap exited with {}: {}", status, errors.trim());
            if output.trim().is_empty() {
                return Err(anyhow!(LanwatchError::ExternalCommand {
                    cmd: label,
                    status: status.to_string(),
                    output: errors,
                }));
            }
        }
        Ok(output)
    }
}

/// Only a container that never started is worth another try. Once nmap has run, its
/// output has already been streamed and a rerun would repeat it.
fn retry_reduced(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<LanwatchError>(),
        Some(LanwatchError::SandboxUnavailable(_))
    )
}

/// nmap in an ephemeral container from the tools image.
pub struct SandboxScanRunner {
    cfg: SandboxConfig,
}

impl SandboxScanRunner {
    pub fn new(cfg: SandboxConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl ScanRunner for SandboxScanRunner {
    #[instrument(skip(self, on_chunk), fields(image = %self.cfg.image))]
    async fn run(
        &self,
        args: &[String],
        timeout: Duration,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String> {
        let mut cmd = vec!["nmap".to_string()];
        cmd.extend(args.iter().cloned());

        let work = async {
            let full = docker::run_ephemeral(
                &self.cfg.image,
                cmd.clone(),
                docker::tools_host_config(&self.cfg, false),
                &mut *on_chunk,
            )
            .await;
            match full {
                Ok(outcome) => Ok(outcome),
                Err(e) if !retry_reduced(&e) => Err(e),
                Err(e) => {
                    warn!(
                        "Scan container failed ({:#}); retrying without host networking or capabilities",
                        e
                    );
                    docker::run_ephemeral(
                        &self.cfg.image,
                        cmd.clone(),
                        docker::tools_host_config(&self.cfg, true),
                        &mut *on_chunk,
                    )
                    .await
                    .map_err(|e| anyhow!(LanwatchError::SandboxUnavailable(format!("{:#}", e))))
                }
            }
        };

        let outcome = match tokio::time::timeout(timeout, work).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Sandboxed scan exceeded {:?}", timeout);
                return Err(anyhow!(LanwatchError::CommandTimeout {
                    cmd: cmd.join(" "),
                    timeout_ms: timeout.as_millis() as u64,
                }));
            }
        };
        if outcome.exit_code != 0 {
            warn!("Sandboxed nmap exited with {}", outcome.exit_code);
        }
        Ok(outcome.output)
    }
}

// --- Orchestration ---

/// Per-sweep settings.
#[derive(Debug, Clone)]
pub struct SweepOptions {
    /// IPs probed at the same time. Results keep input order regardless.
    pub concurrency: usize,
    /// Overrides the configured SSH credentials for the uptime probe.
    pub credentials: Option<SshCredentials>,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            credentials: None,
        }
    }
}

pub struct ScanOrchestrator {
    history: Arc<HistoryStore>,
    scan_cfg: ScanConfig,
    host_scanner: Arc<dyn ScanRunner>,
    sandbox_scanner: Arc<dyn ScanRunner>,
    probes: Arc<ProbeSuite>,
}

impl ScanOrchestrator {
    pub fn new(
        history: Arc<HistoryStore>,
        scan_cfg: ScanConfig,
        sandbox_cfg: SandboxConfig,
        probes: Arc<ProbeSuite>,
    ) -> Self {
        let host_scanner = Arc::new(HostScanRunner::new(scan_cfg.nmap_path.clone()));
        Self::with_runners(
            history,
            scan_cfg,
            host_scanner,
            Arc::new(SandboxScanRunner::new(sandbox_cfg)),
            probes,
        )
    }

    pub fn with_runners(
        history: Arc<HistoryStore>,
        scan_cfg: ScanConfig,
        host_scanner: Arc<dyn ScanRunner>,
        sandbox_scanner: Arc<dyn ScanRunner>,
        probes: Arc<ProbeSuite>,
    ) -> Self {
        Self {
            history,
            scan_cfg,
            host_scanner,
            sandbox_scanner,
            probes,
        }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Scans `range` and returns the devices found up, grouped by vendor.
    ///
    /// # Errors
    ///
    /// * `Validation` - bad target, port list or timing template (nothing is spawned).
    /// * `CommandTimeout` - the scan outlived its timeout.
    /// * `ScanFailed` - the scan produced no output.
    /// * `SandboxUnavailable` / `ExternalCommand` - nmap could not be run.
    #[instrument(skip(self, opts, sink), fields(sandbox = opts.use_sandbox))]
    pub async fn full_scan(
        &self,
        range: &str,
        opts: &ScanOptions,
        sink: &dyn ProgressSink,
    ) -> Result<GroupedDevices> {
        let targets = parse_targets(range)?;
        if let Some(ports) = opts.ports.as_ref().or(self.scan_cfg.default_ports.as_ref()) {
            validate_ports(ports)?;
        }
        if let Some(timing) = opts.timing {
            if timing > 5 {
                return Err(validation(format!(
                    "timing template must be 0-5, got {}",
                    timing
                )));
            }
        }

        let args = build_nmap_args(&targets, opts, &self.scan_cfg);
        let timeout = opts
            .timeout
            .unwrap_or(Duration::from_secs(self.scan_cfg.timeout_secs));
        let (runner, mode) = if opts.use_sandbox {
            (&self.sandbox_scanner, "sandbox")
        } else {
            (&self.host_scanner, "host")
        };
        info!("Scanning {} ({}): nmap {}", targets.join(","), mode, args.join(" "));
        sink.emit(ProgressEvent::status(format!(
            "Scanning {} ({})",
            targets.join(", "),
            mode
        )));

        let mut forward = |chunk: &str| {
            sink.emit(ProgressEvent::Output {
                chunk: chunk.to_string(),
            })
        };
        let output = match runner.run(&args, timeout, &mut forward).await {
            Ok(output) => output,
            Err(e) => {
                error!("Scan of {} failed: {:#}", range, e);
                sink.emit(ProgressEvent::error(None, format!("{:#}", e)));
                return Err(e);
            }
        };
        if output.trim().is_empty() {
            let e = anyhow!(LanwatchError::ScanFailed(format!(
                "no output from scan of {}",
                targets.join(",")
            )));
            sink.emit(ProgressEvent::error(None, e.to_string()));
            return Err(e);
        }

        let grouped = parser::parse(&output);
        let devices: Vec<&DeviceRecord> = grouped.values().flatten().collect();
        for device in &devices {
            self.history
                .record(&device.ip, Metric::ScanResult(Box::new((*device).clone())));
        }
        let ssh_devices: Vec<DeviceRecord> = devices
            .iter()
            .filter(|d| d.ssh_available)
            .map(|d| (*d).clone())
            .collect();
        info!(
            "Scan found {} device(s), {} with SSH",
            devices.len(),
            ssh_devices.len()
        );

        sink.emit(ProgressEvent::Data(DataPayload::SshDevices(ssh_devices)));
        sink.emit(ProgressEvent::Data(DataPayload::Devices(grouped.clone())));
        Ok(grouped)
    }

    /// Measures one IP and records the results.
    async fn sweep_one(
        &self,
        ip: &str,
        creds: Option<&SshCredentials>,
        sink: &dyn ProgressSink,
    ) -> Result<DeviceMetrics> {
        let latency = self.probes.latency(ip).await?;
        self.history.record(ip, Metric::Latency(latency.clone()));

        let metrics = if latency.alive {
            let (bandwidth, uptime, connected) = tokio::join!(
                self.probes.bandwidth(ip),
                self.probes.uptime(ip, creds),
                self.probes.connectivity(ip)
            );
            let bandwidth = match bandwidth {
                Ok(b) => {
                    self.history.record(ip, Metric::Bandwidth(b.clone()));
                    Some(b)
                }
                Err(e) => {
                    warn!("No bandwidth figure for {}: {:#}", ip, e);
                    None
                }
            };
            let uptime = uptime?;
            self.history.record(
                ip,
                Metric::Uptime(UptimeSample {
                    status: Reachability::Up,
                    uptime: uptime.uptime_string.clone(),
                }),
            );
            DeviceMetrics {
                latency,
                bandwidth,
                uptime: Some(uptime),
                connected: Some(connected?),
            }
        } else {
            self.history.record(
                ip,
                Metric::Uptime(UptimeSample {
                    status: Reachability::Down,
                    uptime: None,
                }),
            );
            DeviceMetrics {
                latency,
                bandwidth: None,
                uptime: None,
                connected: None,
            }
        };

        sink.emit(ProgressEvent::PartialUpdate {
            ip: ip.to_string(),
            metrics: metrics.clone(),
        });
        Ok(metrics)
    }

    /// Probes every IP and returns the aggregate in input order. IPs that fail are
    /// reported through the sink and left out of the aggregate.
    #[instrument(skip(self, ips, opts, sink), fields(count = ips.len(), concurrency = opts.concurrency))]
    pub async fn performance_sweep(
        &self,
        ips: &[String],
        opts: &SweepOptions,
        sink: &dyn ProgressSink,
    ) -> SweepSummary {
        sink.emit(ProgressEvent::status(format!(
            "Sweeping {} device(s){}",
            ips.len(),
            if self.probes.uses_sandbox() {
                " in sandbox"
            } else {
                ""
            }
        )));
        let creds = opts.credentials.as_ref();

        let results: Vec<(String, Option<DeviceMetrics>)> = stream::iter(ips.iter())
            .map(|ip| async move {
                match self.sweep_one(ip, creds, sink).await {
                    Ok(metrics) => (ip.clone(), Some(metrics)),
                    Err(e) => {
                        warn!("Sweep of {} failed: {:#}", ip, e);
                        let failure = LanwatchError::ProbeFailure {
                            ip: ip.clone(),
                            message: format!("{:#}", e),
                        };
                        sink.emit(ProgressEvent::error(Some(ip.as_str()), failure.to_string()));
                        (ip.clone(), None)
                    }
                }
            })
            .buffered(opts.concurrency.max(1))
            .collect()
            .await;

        let mut summary = SweepSummary::default();
        for (ip, metrics) in results {
            let Some(metrics) = metrics else { continue };
            if let Some(bandwidth) = metrics.bandwidth {
                summary.bandwidth.push(IpMetric {
                    ip: ip.clone(),
                    value: bandwidth,
                });
            }
            if let Some(uptime) = metrics.uptime {
                summary.uptime.push(IpMetric {
                    ip: ip.clone(),
                    value: uptime,
                });
            }
            summary.latency.push(IpMetric {
                ip,
                value: metrics.latency,
            });
        }
        debug!(
            "Sweep done: {} latency, {} bandwidth, {} uptime result(s)",
            summary.latency.len(),
            summary.bandwidth.len(),
            summary.uptime.len()
        );
        sink.emit(ProgressEvent::Data(DataPayload::Sweep(summary.clone())));
        summary
    }

    /// Runs `cycles` sweeps (forever when `None`), `interval` apart, and returns each IP's
    /// uptime percentage over everything recorded so far.
    pub async fn watch(
        &self,
        ips: &[String],
        interval: Duration,
        cycles: Option<u32>,
        opts: &SweepOptions,
        sink: &dyn ProgressSink,
    ) -> BTreeMap<String, Option<f64>> {
        let mut cycle = 0u32;
        loop {
            cycle += 1;
            info!("Watch cycle {}", cycle);
            self.performance_sweep(ips, opts, sink).await;

            let availability = self.uptime_report(ips);
            let line = availability
                .iter()
                .map(|(ip, pct)| match pct {
                    Some(pct) => format!("{} {:.2}%", ip, pct),
                    None => format!("{} n/a", ip),
                })
                .collect::<Vec<_>>()
                .join(", ");
            sink.emit(ProgressEvent::status(format!(
                "Cycle {} uptime: {}",
                cycle, line
            )));

            if cycles.is_some_and(|n| cycle >= n) {
                return availability;
            }
            tokio::time::sleep(interval).await;
        }
    }

    fn uptime_report(&self, ips: &[String]) -> BTreeMap<String, Option<f64>> {
        ips.iter()
            .map(|ip| (ip.clone(), self.history.uptime_percentage(ip)))
            .collect()
    }
}
