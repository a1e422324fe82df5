//! # Probe Suite
//!
//! File: cli/src/monitor/probes/mod.rs
//!
//! ## Overview
//!
//! Per-device health measurements: latency, connectivity, bandwidth and remote uptime.
//! A `ProbeSuite` is built once per run with the execution mode fixed:
//!
//! - **host mode**: commands run through the local shell (`HostRunner`), `ping -c 3`.
//! - **sandbox mode**: commands run inside the tools container through the
//!   `SandboxCommandExecutor`, `ping -c 5`; the SSH uptime probe is skipped.
//!
//! Every IP is parsed as an `IpAddr` before any command string is built, so nothing
//! user-supplied reaches a shell unvalidated.
//!
//! ## Architecture
//!
//! - `latency`: ping summary parsing.
//! - `connectivity`: single-ping up/down.
//! - `bandwidth`: ordered strategy list (iperf3 → curl → simulated).
//! - `uptime`: TCP/22 check plus `uptime` over ssh.
//!
//! Probe failures never surface as errors: they come back as offline/unavailable
//! results. The only error a probe method returns is `Validation` for a bad IP.
//!
pub mod bandwidth;
pub mod connectivity;
pub mod latency;
pub mod uptime;

use crate::common::process::{CommandRunner, HostRunner};
use crate::core::config::Config;
use crate::core::error::{LanwatchError, Result};
use crate::monitor::model::{BandwidthResult, LatencyResult, SshCredentials, UptimeResult};
use crate::monitor::sandbox::SandboxCommandExecutor;
use anyhow::anyhow;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use bandwidth::BandwidthProber;
use uptime::UptimeProbe;

/// Parses `ip` as an IPv4 or IPv6 address.
pub fn validate_ip(ip: &str) -> Result<IpAddr> {
    ip.trim().parse::<IpAddr>().map_err(|_| {
        anyhow!(LanwatchError::Validation(format!(
            "'{}' is not a valid IP address",
            ip
        )))
    })
}

pub struct ProbeSuite {
    runner: Arc<dyn CommandRunner>,
    use_sandbox: bool,
    ping_count: u32,
    ping_timeout: Duration,
    bandwidth: BandwidthProber,
    uptime: UptimeProbe,
    default_credentials: SshCredentials,
}

impl ProbeSuite {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        use_sandbox: bool,
        ping_count: u32,
        ping_timeout: Duration,
        bandwidth: BandwidthProber,
        uptime: UptimeProbe,
        default_credentials: SshCredentials,
    ) -> Self {
        Self {
            runner,
            use_sandbox,
            ping_count,
            ping_timeout,
            bandwidth,
            uptime,
            default_credentials,
        }
    }

    /// Suite for `config`. Sandbox mode requires `executor`; host mode ignores it.
    pub fn from_config(
        config: &Config,
        use_sandbox: bool,
        executor: Option<Arc<SandboxCommandExecutor>>,
    ) -> Result<Self> {
        let probes = &config.probes;
        let (runner, ping_count): (Arc<dyn CommandRunner>, u32) = if use_sandbox {
            let executor = executor.ok_or_else(|| {
                anyhow!(LanwatchError::SandboxUnavailable(
                    "sandbox mode requested without an executor".into()
                ))
            })?;
            (executor as Arc<dyn CommandRunner>, probes.sandbox_ping_count)
        } else {
            (Arc::new(HostRunner) as Arc<dyn CommandRunner>, probes.host_ping_count)
        };

        Ok(Self::new(
            runner,
            use_sandbox,
            ping_count,
            Duration::from_millis(probes.ping_timeout_ms),
            BandwidthProber::from_config(probes),
            UptimeProbe::from_config(use_sandbox, &config.ssh),
            SshCredentials {
                username: config.ssh.username.clone(),
                password: config.ssh.password.clone(),
            },
        ))
    }

    pub fn uses_sandbox(&self) -> bool {
        self.use_sandbox
    }

    pub async fn latency(&self, ip: &str) -> Result<LatencyResult> {
        let addr = validate_ip(ip)?;
        Ok(latency::measure(self.runner.as_ref(), &addr, self.ping_count, self.ping_timeout).await)
    }

    pub async fn connectivity(&self, ip: &str) -> Result<bool> {
        let addr = validate_ip(ip)?;
        Ok(connectivity::check(self.runner.as_ref(), &addr, self.ping_timeout).await)
    }

    pub async fn bandwidth(&self, ip: &str) -> Result<BandwidthResult> {
        let addr = validate_ip(ip)?;
        self.bandwidth.measure(self.runner.as_ref(), &addr).await
    }

    /// Remote uptime using `creds`, or the configured defaults.
    pub async fn uptime(&self, ip: &str, creds: Option<&SshCredentials>) -> Result<UptimeResult> {
        let addr = validate_ip(ip)?;
        let creds = creds.unwrap_or(&self.default_credentials);
        Ok(self.uptime.measure(addr, creds).await)
    }
}
