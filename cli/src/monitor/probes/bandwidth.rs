//! # Bandwidth Probe
//!
//! File: cli/src/monitor/probes/bandwidth.rs
//!
//! ## Overview
//!
//! Measures download/upload throughput in Mbps through an ordered list of strategies.
//! The first one that succeeds wins and its name is attached to the result:
//!
//! 1. **`iperf3`**: reverse run (download) then forward run (upload) against the
//!    configured iperf3 endpoint, JSON output.
//! 2. **`curl-fallback`**: timed HTTP download of a test file; upload is estimated at
//!    20% of download.
//! 3. **`simulated`**: pseudo-random plausible numbers. Never fails, so a sweep always
//!    has a bandwidth figure. Consumers decide how far to trust it from `source`.
//!
//! Only `iperf3` results are measurements of upload.
//!
use crate::common::process::{shell_quote, CommandRunner};
use crate::core::config::ProbeConfig;
use crate::core::error::{LanwatchError, Result};
use crate::monitor::model::{BandwidthResult, BandwidthSource};
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use rand::Rng;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{info, warn};

/// Share of the measured download used as the upload estimate when only a download
/// was measured.
pub const CURL_UPLOAD_RATIO: f64 = 0.2;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One way of obtaining a bandwidth figure.
#[async_trait]
pub trait BandwidthStrategy: Send + Sync {
    fn source(&self) -> BandwidthSource;

    async fn measure(&self, runner: &dyn CommandRunner, ip: &IpAddr) -> Result<BandwidthResult>;
}

/// `iperf3 -J` against a fixed server.
pub struct Iperf3Strategy {
    pub host: String,
    pub port: u16,
    pub duration_secs: u32,
    pub timeout: Duration,
}

impl Iperf3Strategy {
    fn command(&self, reverse: bool) -> String {
        format!(
            "iperf3 -c {} -p {} -J -t {}{}",
            shell_quote(&self.host),
            self.port,
            self.duration_secs,
            if reverse { " -R" } else { "" }
        )
    }
}

/// Extracts `end.<section>.bits_per_second` from iperf3 JSON output, in Mbps.
///
/// iperf3 reports failures inside the JSON document (`{"error": "..."}`), often with exit
/// status 0, so the `error` key is checked first.
pub fn parse_iperf3_json(output: &str, section: &str) -> Result<f64> {
    let start = output
        .find('{')
        .ok_or_else(|| anyhow!("iperf3 produced no JSON"))?;
    let doc: serde_json::Value =
        serde_json::from_str(&output[start..]).context("Failed to parse iperf3 JSON output")?;

    if let Some(err) = doc.get("error").and_then(|e| e.as_str()) {
        bail!("iperf3 error: {}", err);
    }
    let bps = doc
        .pointer(&format!("/end/{}/bits_per_second", section))
        .and_then(|v| v.as_f64())
        .ok_or_else(|| anyhow!("iperf3 JSON has no end.{}.bits_per_second", section))?;
    Ok(round2(bps / 1_000_000.0))
}

#[async_trait]
impl BandwidthStrategy for Iperf3Strategy {
    fn source(&self) -> BandwidthSource {
        BandwidthSource::Iperf3
    }

    async fn measure(&self, runner: &dyn CommandRunner, _ip: &IpAddr) -> Result<BandwidthResult> {
        let down = runner.run(&self.command(true), self.timeout).await?;
        let download = parse_iperf3_json(&down, "sum_received")?;
        let up = runner.run(&self.command(false), self.timeout).await?;
        let upload = parse_iperf3_json(&up, "sum_sent")?;
        Ok(BandwidthResult {
            download,
            upload,
            source: BandwidthSource::Iperf3,
        })
    }
}

/// Timed bulk download with curl.
pub struct CurlStrategy {
    pub url: String,
    pub timeout: Duration,
}

/// curl's `%{speed_download}` (bytes per second) as Mbps.
pub fn parse_curl_speed(output: &str) -> Result<f64> {
    let bytes_per_sec: f64 = output
        .trim()
        .parse()
        .with_context(|| format!("Unexpected curl output: {:?}", output.trim()))?;
    if bytes_per_sec <= 0.0 {
        bail!("curl measured no throughput");
    }
    Ok(round2(bytes_per_sec * 8.0 / 1_000_000.0))
}

#[async_trait]
impl BandwidthStrategy for CurlStrategy {
    fn source(&self) -> BandwidthSource {
        BandwidthSource::CurlFallback
    }

    async fn measure(&self, runner: &dyn CommandRunner, _ip: &IpAddr) -> Result<BandwidthResult> {
        let command = format!(
            "curl -s -o /dev/null -w '%{{speed_download}}' --max-time {} {}",
            self.timeout.as_secs().max(1),
            shell_quote(&self.url)
        );
        // curl gets its own --max-time; the runner budget leaves it room to report
        let output = runner.run(&command, self.timeout + Duration::from_secs(5)).await?;
        let download = parse_curl_speed(&output)?;
        Ok(BandwidthResult {
            download,
            upload: round2(download * CURL_UPLOAD_RATIO),
            source: BandwidthSource::CurlFallback,
        })
    }
}

/// Random download in 50..150 Mbps and upload in 10..50 Mbps.
pub struct SimulatedStrategy;

#[async_trait]
impl BandwidthStrategy for SimulatedStrategy {
    fn source(&self) -> BandwidthSource {
        BandwidthSource::Simulated
    }

    async fn measure(&self, _runner: &dyn CommandRunner, _ip: &IpAddr) -> Result<BandwidthResult> {
        let mut rng = rand::rng();
        Ok(BandwidthResult {
            download: round2(rng.random_range(50.0..150.0)),
            upload: round2(rng.random_range(10.0..50.0)),
            source: BandwidthSource::Simulated,
        })
    }
}

/// Runs strategies in order until one succeeds.
pub struct BandwidthProber {
    strategies: Vec<Box<dyn BandwidthStrategy>>,
}

impl BandwidthProber {
    pub fn new(strategies: Vec<Box<dyn BandwidthStrategy>>) -> Self {
        Self { strategies }
    }

    /// iperf3, then curl, then simulated, configured from `[probes]`.
    pub fn from_config(cfg: &ProbeConfig) -> Self {
        Self::new(vec![
            Box::new(Iperf3Strategy {
                host: cfg.bandwidth_host.clone(),
                port: cfg.bandwidth_port,
                duration_secs: cfg.iperf_duration_secs,
                timeout: Duration::from_millis(cfg.bandwidth_timeout_ms),
            }),
            Box::new(CurlStrategy {
                url: cfg.curl_test_url.clone(),
                timeout: Duration::from_millis(cfg.curl_timeout_ms),
            }),
            Box::new(SimulatedStrategy),
        ])
    }

    pub async fn measure(&self, runner: &dyn CommandRunner, ip: &IpAddr) -> Result<BandwidthResult> {
        for (tier, strategy) in self.strategies.iter().enumerate() {
            if tier > 0 {
                info!("Bandwidth for {}: falling back to {}", ip, strategy.source());
            }
            match strategy.measure(runner, ip).await {
                Ok(result) => return Ok(result),
                Err(e) => warn!(
                    "Bandwidth strategy {} failed for {}: {:#}",
                    strategy.source(),
                    ip,
                    e
                ),
            }
        }
        Err(anyhow!(LanwatchError::ProbeFailure {
            ip: ip.to_string(),
            message: "every bandwidth strategy failed".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers by command prefix and records what it was asked to run.
    struct ScriptedRunner {
        iperf3: Option<String>,
        curl: Option<String>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn new(iperf3: Option<&str>, curl: Option<&str>) -> Self {
            Self {
                iperf3: iperf3.map(str::to_string),
                curl: curl.map(str::to_string),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, command: &str, _timeout: Duration) -> Result<String> {
            self.seen.lock().unwrap().push(command.to_string());
            let answer = if command.starts_with("iperf3") {
                self.iperf3.clone()
            } else if command.starts_with("curl") {
                self.curl.clone()
            } else {
                None
            };
            answer.ok_or_else(|| anyhow!("sh: 1: {}: not found", command))
        }

        fn label(&self) -> &'static str {
            "scripted"
        }
    }

    fn prober() -> BandwidthProber {
        BandwidthProber::from_config(&ProbeConfig::default())
    }

    fn ip() -> IpAddr {
        "192.168.1.10".parse().unwrap()
    }

    const IPERF_OK: &str = r#"{
        "start": {},
        "end": {
            "sum_sent": {"bits_per_second": 94500000.0},
            "sum_received": {"bits_per_second": 187250000.0}
        }
    }"#;

    #[tokio::test]
    async fn test_iperf3_success() {
        let runner = ScriptedRunner::new(Some(IPERF_OK), None);
        let r = prober().measure(&runner, &ip()).await.unwrap();
        assert_eq!(r.source, BandwidthSource::Iperf3);
        assert_eq!(r.download, 187.25);
        assert_eq!(r.upload, 94.5);

        let seen = runner.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].ends_with(" -R"));
        assert!(!seen[1].contains(" -R"));
    }

    #[tokio::test]
    async fn test_iperf3_failure_falls_back_to_curl() {
        // 1_250_000 bytes/s = 10 Mbps
        let runner = ScriptedRunner::new(
            Some(r#"{"error": "unable to connect to server: Connection refused"}"#),
            Some("1250000.000"),
        );
        let r = prober().measure(&runner, &ip()).await.unwrap();
        assert_eq!(r.source, BandwidthSource::CurlFallback);
        assert_eq!(r.download, 10.0);
        assert_eq!(r.upload, 2.0);
    }

    #[tokio::test]
    async fn test_both_fail_yields_simulated() {
        let runner = ScriptedRunner::new(None, None);
        let r = prober().measure(&runner, &ip()).await.unwrap();
        assert_eq!(r.source, BandwidthSource::Simulated);
        assert!((50.0..=150.0).contains(&r.download));
        assert!((10.0..=50.0).contains(&r.upload));
    }

    #[tokio::test]
    async fn test_curl_zero_speed_is_failure() {
        let runner = ScriptedRunner::new(None, Some("0.000"));
        let r = prober().measure(&runner, &ip()).await.unwrap();
        assert_eq!(r.source, BandwidthSource::Simulated);
    }

    #[tokio::test]
    async fn test_without_simulated_tier_all_failures_is_error() {
        let prober = BandwidthProber::new(vec![Box::new(CurlStrategy {
            url: "http://example.invalid/file".into(),
            timeout: Duration::from_secs(1),
        })]);
        let runner = ScriptedRunner::new(None, None);
        let err = prober.measure(&runner, &ip()).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<LanwatchError>().map(|e| e.kind()),
            Some("probe_failure")
        );
    }

    #[test]
    fn test_parse_iperf3_tolerates_leading_noise() {
        let out = format!("warning: something\n{}", IPERF_OK);
        assert_eq!(parse_iperf3_json(&out, "sum_sent").unwrap(), 94.5);
        assert!(parse_iperf3_json("iperf3: command not found", "sum_sent").is_err());
    }
}
