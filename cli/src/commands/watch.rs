//! # Watch Command
//!
//! File: cli/src/commands/watch.rs
//!
//! ## Overview
//!
//! `lanwatch watch <IP>...` repeats the sweep every `--interval` seconds against one
//! history, so each cycle also reports uptime percentages over all cycles so far. Runs
//! until `--cycles` is reached or Ctrl-C.
//!
//! ## Architecture
//!
//! The orchestrator emits into a `ChannelSink`; a printer task drains the channel and
//! renders each event as one readable line (or as a JSON line with `--json`). Errors go
//! to stderr.
//!
use super::sweep::ProbeArgs;
use super::{build_engine, load_config};
use crate::common::progress::{ChannelSink, ProgressEvent};
use crate::core::error::Result;
use crate::monitor::history::{Metric, MetricKind, UptimeSample};
use crate::monitor::model::DeviceMetrics;
use clap::Parser;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(about = "Sweep IPs repeatedly and track uptime percentages")]
pub struct WatchArgs {
    /// IP addresses to watch.
    #[arg(required = true, num_args = 1..)]
    ips: Vec<String>,
    /// Seconds between cycles.
    #[arg(long, default_value_t = 60, value_name = "SECS")]
    interval: u64,
    /// Stop after N cycles (default: run until interrupted).
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    cycles: Option<u32>,
    /// Print events as JSON lines instead of text.
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    probe: ProbeArgs,
}

/// One line for a per-IP update.
fn describe_metrics(ip: &str, m: &DeviceMetrics) -> String {
    if !m.latency.alive {
        return format!("{:<15} down", ip);
    }
    let mut line = format!(
        "{:<15} up    {:>8.2} ms  {:>5.1}% loss",
        ip,
        m.latency.latency.unwrap_or_default(),
        m.latency.packet_loss
    );
    if let Some(bw) = &m.bandwidth {
        line.push_str(&format!(
            "  {:.2}/{:.2} Mbps ({})",
            bw.download, bw.upload, bw.source
        ));
    }
    match &m.uptime {
        Some(u) if u.available => {
            line.push_str(&format!("  uptime {}", u.uptime_string.as_deref().unwrap_or("?")))
        }
        Some(u) => line.push_str(&format!(
            "  uptime n/a ({})",
            u.reason.as_deref().unwrap_or("unknown")
        )),
        None => {}
    }
    if m.connected == Some(false) {
        line.push_str("  [single ping lost]");
    }
    line
}

/// Text rendering of an event; `None` for events not shown in text mode.
fn render(event: &ProgressEvent) -> Option<String> {
    match event {
        ProgressEvent::Status { message } => Some(format!("== {}", message)),
        ProgressEvent::PartialUpdate { ip, metrics } => Some(describe_metrics(ip, metrics)),
        ProgressEvent::Error { ip, message } => Some(match ip {
            Some(ip) => format!("!! {}: {}", ip, message),
            None => format!("!! {}", message),
        }),
        ProgressEvent::Data(_) | ProgressEvent::Output { .. } => None,
    }
}

pub async fn handle_watch(args: WatchArgs, config_path: Option<&Path>) -> Result<()> {
    let cfg = load_config(config_path)?;
    let engine = build_engine(&cfg, args.probe.use_sandbox(&cfg))?;
    let opts = args.probe.sweep_options(&cfg);

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let json = args.json;
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("Failed to serialize event: {}", e),
                }
            } else if let Some(line) = render(&event) {
                if matches!(event, ProgressEvent::Error { .. }) {
                    eprintln!("{}", line);
                } else {
                    println!("{}", line);
                }
            }
        }
    });

    let sink = ChannelSink::new(tx);
    let interval = Duration::from_secs(args.interval);
    tokio::select! {
        report = engine.orchestrator.watch(&args.ips, interval, args.cycles, &opts, &sink) => {
            info!("Watch finished: {:?}", report);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping watch");
        }
    }
    engine.log_executor_status();

    // closing the channel ends the printer once it has drained
    drop(sink);
    if let Err(e) = printer.await {
        warn!("Printer task failed: {}", e);
    }

    let history = engine.orchestrator.history();
    let summary: Vec<AvailabilityLine> = history
        .ips()
        .into_iter()
        .map(|ip| AvailabilityLine {
            samples: history.get(&ip, MetricKind::Uptime).len(),
            uptime_percentage: history.uptime_percentage(&ip),
            last: history
                .latest(&ip, MetricKind::Uptime)
                .and_then(|entry| match entry.metric {
                    Metric::Uptime(sample) => Some(sample),
                    _ => None,
                }),
            ip,
        })
        .collect();
    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!("== Availability");
        for line in &summary {
            println!("{}", line);
        }
    }
    Ok(())
}

/// Per-IP availability over the whole watch.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AvailabilityLine {
    ip: String,
    samples: usize,
    uptime_percentage: Option<f64>,
    last: Option<UptimeSample>,
}

impl fmt::Display for AvailabilityLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.uptime_percentage {
            Some(pct) => write!(f, "{:<15} {:>6.2}% up over {} sample(s)", self.ip, pct, self.samples)?,
            None => write!(f, "{:<15} no samples", self.ip)?,
        }
        if let Some(UptimeSample {
            uptime: Some(uptime),
            ..
        }) = &self.last
        {
            write!(f, ", remote uptime {}", uptime)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::model::{
        BandwidthResult, BandwidthSource, LatencyResult, Reachability, UptimeResult,
    };

    fn alive_metrics() -> DeviceMetrics {
        DeviceMetrics {
            latency: LatencyResult {
                latency: Some(1.5),
                alive: true,
                packet_loss: 0.0,
            },
            bandwidth: Some(BandwidthResult {
                download: 94.5,
                upload: 18.9,
                source: BandwidthSource::CurlFallback,
            }),
            uptime: Some(UptimeResult::unavailable("SSH port 22 not reachable")),
            connected: Some(true),
        }
    }

    #[test]
    fn test_describe_alive_host() {
        let line = describe_metrics("10.0.0.5", &alive_metrics());
        assert!(line.starts_with("10.0.0.5"));
        assert!(line.contains("1.50 ms"));
        assert!(line.contains("94.50/18.90 Mbps (curl-fallback)"));
        assert!(line.contains("uptime n/a (SSH port 22 not reachable)"));
        assert!(!line.contains("single ping lost"));
    }

    #[test]
    fn test_describe_down_host() {
        let metrics = DeviceMetrics {
            latency: LatencyResult::offline(),
            bandwidth: None,
            uptime: None,
            connected: None,
        };
        assert_eq!(describe_metrics("10.0.0.9", &metrics).trim_end(), "10.0.0.9        down");
    }

    #[test]
    fn test_availability_line() {
        let line = AvailabilityLine {
            ip: "10.0.0.5".into(),
            samples: 3,
            uptime_percentage: Some(66.67),
            last: Some(UptimeSample {
                status: Reachability::Up,
                uptime: Some("3 days,  4:02".into()),
            }),
        };
        assert_eq!(
            line.to_string(),
            "10.0.0.5         66.67% up over 3 sample(s), remote uptime 3 days,  4:02"
        );
    }

    #[test]
    fn test_render_skips_raw_output() {
        assert!(render(&ProgressEvent::Output {
            chunk: "Nmap scan report".into()
        })
        .is_none());
        assert_eq!(
            render(&ProgressEvent::error(Some("10.0.0.1"), "boom")).as_deref(),
            Some("!! 10.0.0.1: boom")
        );
    }
}
