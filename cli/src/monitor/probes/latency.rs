//! Latency probe: ping summary parsing.
//!
//! Understands the iputils (`rtt min/avg/max/mdev`), BSD/macOS
//! (`round-trip min/avg/max/stddev`) and Windows (`Average = Nms`) summaries.

use crate::common::process::CommandRunner;
use crate::monitor::model::LatencyResult;
use regex::Regex;
use std::net::IpAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

struct PingPatterns {
    rtt: Regex,
    loss: Regex,
    win_avg: Regex,
    win_loss: Regex,
}

fn patterns() -> &'static PingPatterns {
    static PATTERNS: OnceLock<PingPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| PingPatterns {
        rtt: Regex::new(
            r"(?:rtt|round-trip) min/avg/max(?:/(?:mdev|stddev))? = ([\d.]+)/([\d.]+)/([\d.]+)",
        )
        .expect("valid rtt regex"),
        loss: Regex::new(r"([\d.]+)% packet loss").expect("valid loss regex"),
        win_avg: Regex::new(r"Average = (\d+)ms").expect("valid average regex"),
        win_loss: Regex::new(r"\((\d+)% loss\)").expect("valid loss regex"),
    })
}

/// `ping` invocation for the current platform.
pub fn ping_command(ip: &IpAddr, count: u32) -> String {
    if cfg!(target_os = "windows") {
        format!("ping -n {} {}", count, ip)
    } else {
        format!("ping -c {} {}", count, ip)
    }
}

/// Parses a ping summary. Output without a round-trip summary means the host did not
/// answer: `{latency: None, alive: false, packetLoss: 100}`.
pub fn parse_ping_output(output: &str) -> LatencyResult {
    let p = patterns();

    let avg = p
        .rtt
        .captures(output)
        .and_then(|c| c[2].parse::<f64>().ok())
        .or_else(|| {
            p.win_avg
                .captures(output)
                .and_then(|c| c[1].parse::<f64>().ok())
        });
    let Some(avg) = avg else {
        return LatencyResult::offline();
    };

    let packet_loss = p
        .loss
        .captures(output)
        .or_else(|| p.win_loss.captures(output))
        .and_then(|c| c[1].parse::<f64>().ok())
        .unwrap_or(0.0);

    LatencyResult {
        latency: Some(avg),
        alive: true,
        packet_loss,
    }
}

/// Pings `ip` `count` times. Runner errors (timeout, unreachable network) mean offline.
pub async fn measure(
    runner: &dyn CommandRunner,
    ip: &IpAddr,
    count: u32,
    timeout: Duration,
) -> LatencyResult {
    match runner.run(&ping_command(ip, count), timeout).await {
        Ok(output) => parse_ping_output(&output),
        Err(e) => {
            debug!("latency probe for {} via {} failed: {:#}", ip, runner.label(), e);
            LatencyResult::offline()
        }
    }
}
