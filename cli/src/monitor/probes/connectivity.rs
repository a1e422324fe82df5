//! Connectivity probe: a single ping, up iff exactly one reply came back.

use crate::common::process::CommandRunner;
use regex::Regex;
use std::net::IpAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

fn received() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b1 (?:packets )?received|Received = 1\b").expect("valid regex"))
}

/// `true` iff the output reports one packet received.
pub fn reply_received(output: &str) -> bool {
    received().is_match(output)
}

pub async fn check(runner: &dyn CommandRunner, ip: &IpAddr, timeout: Duration) -> bool {
    let command = if cfg!(target_os = "windows") {
        format!("ping -n 1 -w 2000 {}", ip)
    } else {
        format!("ping -c 1 -W 2 {}", ip)
    };
    match runner.run(&command, timeout).await {
        Ok(output) => reply_received(&output),
        Err(e) => {
            debug!("connectivity check for {} failed: {:#}", ip, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_markers() {
        assert!(reply_received(
            "1 packets transmitted, 1 received, 0% packet loss, time 0ms"
        ));
        assert!(reply_received(
            "1 packets transmitted, 1 packets received, 0.0% packet loss"
        ));
        assert!(reply_received("Packets: Sent = 1, Received = 1, Lost = 0"));
        assert!(!reply_received(
            "1 packets transmitted, 0 received, 100% packet loss"
        ));
        // "11 received" must not count
        assert!(!reply_received("12 packets transmitted, 11 received"));
    }
}
