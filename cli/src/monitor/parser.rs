//! # Scan Output Parser
//!
//! File: cli/src/monitor/parser.rs
//!
//! ## Overview
//!
//! Turns the raw, human-oriented text that nmap prints on stdout into `DeviceRecord`s
//! grouped by MAC vendor. Parsing is best-effort: unknown lines are skipped, missing
//! fields stay empty, and nothing here returns an error. Empty input yields an empty map.
//!
//! ## Architecture
//!
//! `OutputParser` is a small line-driven state machine:
//!
//! | State           | Entered on                                   | Lines handled                         |
//! |-----------------|----------------------------------------------|---------------------------------------|
//! | `Idle`          | start, `Nmap done`                           | ignored until the first report header |
//! | `InDevice`      | `Nmap scan report for <ip>`                  | MAC, `Host is up`, port lines         |
//! | `InOsBlock`     | `OS detection performed`, `OS fingerprint`,  | OS marker lines (buffered verbatim)   |
//! |                 | or any recognised OS marker line             |                                       |
//! | `InAuthMethods` | a `ssh-auth-methods` script line             | `\|`-prefixed method names            |
//!
//! Every report header flushes the device being accumulated, as does `Nmap done` and the
//! end of input. After parsing, only devices whose status is `up` are kept; they are then
//! grouped under their vendor label (`"Unknown"` when there is none). Vendor labels are
//! never synthesised from the IP address.
//!
//! ## Usage
//!
//! ```rust
//! let grouped = parser::parse(&raw_stdout);
//! for (vendor, devices) in &grouped {
//!     println!("{}: {} device(s)", vendor, devices.len());
//! }
//! ```
//!
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, trace};

use super::model::{
    DeviceRecord, DeviceStatus, GroupedDevices, MacInfo, OsDetails, OsInfo, SshService,
    UNKNOWN_VENDOR,
};

/// Prefixes of lines that belong to a host's OS/service detection block.
const OS_MARKERS: &[&str] = &[
    "Device type:",
    "Running:",
    "Running (JUST GUESSING):",
    "OS CPE:",
    "OS details:",
    "Aggressive OS guesses:",
    "No exact OS matches",
    "Uptime guess:",
    "Network Distance:",
    "TCP Sequence Prediction:",
    "IP ID Sequence Generation:",
    "Service Info:",
    "Too many fingerprints",
    "Accuracy:",
];

/// Parser position within the scan output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Idle,
    InDevice,
    InOsBlock,
    InAuthMethods,
}

struct Patterns {
    header: Regex,
    host_up: Regex,
    mac: Regex,
    port_line: Regex,
    percentage: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        header: Regex::new(r"scan report for (?:(.+?) \()?(\d{1,3}(?:\.\d{1,3}){3})\)?")
            .expect("valid header regex"),
        host_up: Regex::new(r"Host is up(?:\s*\(([\d.]+)s latency\))?")
            .expect("valid host-up regex"),
        mac: Regex::new(r"MAC Address:\s*([0-9A-Fa-f:\-]{12,17})(?:\s+\((.*)\))?\s*$")
            .expect("valid MAC regex"),
        port_line: Regex::new(r"^\d+/tcp").expect("valid port regex"),
        percentage: Regex::new(r"(\d{1,3})%").expect("valid percentage regex"),
    })
}

/// Accumulates one device's fields until its block ends.
#[derive(Debug)]
struct DeviceBuilder {
    record: DeviceRecord,
    os_lines: Vec<String>,
    os_name: Option<String>,
    os_guess: Option<String>,
    accuracy: Option<u8>,
}

impl DeviceBuilder {
    fn new(ip: &str, hostname: Option<&str>) -> Self {
        let mut record = DeviceRecord::new(ip);
        record.hostname = hostname.map(str::to_string);
        Self {
            record,
            os_lines: Vec::new(),
            os_name: None,
            os_guess: None,
            accuracy: None,
        }
    }

    fn finish(self) -> DeviceRecord {
        let mut record = self.record;
        let name = self.os_name.or(self.os_guess);

        if name.is_some() || self.accuracy.is_some() {
            record.os_details = Some(OsDetails {
                name: name.clone(),
                accuracy: self.accuracy,
            });
        }
        if !self.os_lines.is_empty() || name.is_some() {
            record.os_info = Some(OsInfo {
                available: true,
                name,
                accuracy: self.accuracy,
                full: self.os_lines.clone(),
            });
        }
        record.raw_os_info = self.os_lines;
        record
    }
}

/// Line-driven parser for nmap's normal output format.
#[derive(Debug)]
pub struct OutputParser {
    state: ParserState,
    // State to return to once an auth-methods block closes.
    resume: ParserState,
    current: Option<DeviceBuilder>,
    devices: Vec<DeviceRecord>,
}

impl Default for OutputParser {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Idle,
            resume: ParserState::InDevice,
            current: None,
            devices: Vec::new(),
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Feeds one line of scan output.
    pub fn feed_line(&mut self, raw: &str) {
        let line = raw.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim();
        let p = patterns();

        if let Some(caps) = p.header.captures(trimmed) {
            self.flush();
            let hostname = caps.get(1).map(|m| m.as_str());
            let ip = caps.get(2).map_or("", |m| m.as_str());
            trace!("Report header for {}", ip);
            self.current = Some(DeviceBuilder::new(ip, hostname));
            self.state = ParserState::InDevice;
            return;
        }

        if trimmed.starts_with("Nmap done") {
            self.flush();
            self.state = ParserState::Idle;
            return;
        }

        match self.state {
            ParserState::Idle => return,
            ParserState::InAuthMethods => {
                if trimmed.starts_with('|') {
                    self.auth_methods_line(trimmed);
                    return;
                }
                // Any non-script line closes the block and is handled normally below.
                self.state = self.resume;
            }
            ParserState::InDevice | ParserState::InOsBlock => {}
        }

        self.device_line(trimmed);
    }

    /// Flushes the last device and returns every device seen, regardless of status.
    pub fn finish(mut self) -> Vec<DeviceRecord> {
        self.flush();
        self.devices
    }

    fn flush(&mut self) {
        if let Some(builder) = self.current.take() {
            let record = builder.finish();
            debug!(
                "Parsed device {} (status: {:?}, ports: {}, closed in {:?})",
                record.ip,
                record.status,
                record.ports.len(),
                self.state()
            );
            self.devices.push(record);
        }
        self.resume = ParserState::InDevice;
    }

    fn device_line(&mut self, trimmed: &str) {
        let p = patterns();
        let Some(builder) = self.current.as_mut() else {
            return;
        };

        if trimmed.starts_with("MAC Address:") {
            apply_mac_line(&mut builder.record, trimmed);
        } else if let Some(caps) = p.host_up.captures(trimmed) {
            builder.record.status = DeviceStatus::Up;
            if let Some(latency) = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) {
                builder.record.latency = Some(latency);
            }
        } else if p.port_line.is_match(trimmed) {
            builder.record.ports.push(trimmed.to_string());
            if let Some(ssh) = ssh_service_from_port_line(trimmed) {
                builder.record.ssh_available = true;
                builder.record.ssh_service = Some(ssh.clone());
                builder.record.ssh = Some(ssh);
            }
        } else if trimmed.contains("ssh-auth-methods") {
            self.resume = self.state;
            self.state = ParserState::InAuthMethods;
        } else if trimmed.contains("OS detection performed") {
            self.state = ParserState::InOsBlock;
            self.resume = ParserState::InOsBlock;
        } else if trimmed.contains("OS fingerprint") {
            builder.os_lines.push(trimmed.to_string());
            self.state = ParserState::InOsBlock;
            self.resume = ParserState::InOsBlock;
        } else if OS_MARKERS.iter().any(|m| trimmed.starts_with(m)) {
            apply_os_line(builder, trimmed);
            self.state = ParserState::InOsBlock;
            self.resume = ParserState::InOsBlock;
        }
    }

    fn auth_methods_line(&mut self, trimmed: &str) {
        let closes = trimmed.starts_with("|_");
        let body = trimmed.trim_start_matches('|').trim_start_matches('_').trim();

        let is_header = body.is_empty() || body.ends_with(':') || body.contains("ssh-auth-methods");
        if !is_header {
            if let Some(builder) = self.current.as_mut() {
                builder.record.ssh_auth_methods.push(body.to_string());
            }
        }
        if closes {
            self.state = self.resume;
        }
    }
}

fn apply_mac_line(record: &mut DeviceRecord, trimmed: &str) {
    let (mac, vendor) = match patterns().mac.captures(trimmed) {
        Some(caps) => (
            caps.get(1).map(|m| m.as_str().to_string()),
            caps.get(2).map(|m| m.as_str().trim().to_string()),
        ),
        None => split_mac_line(trimmed),
    };

    let Some(mac) = mac.filter(|m| !m.is_empty()) else {
        return;
    };
    let vendor = vendor.filter(|v| !v.is_empty());
    record.mac_info = Some(MacInfo {
        available: true,
        address: mac.clone(),
        vendor: vendor.clone().unwrap_or_else(|| UNKNOWN_VENDOR.to_string()),
    });
    record.mac = Some(mac);
    record.vendor = vendor;
}

/// Fallback for MAC lines the primary pattern does not accept.
fn split_mac_line(trimmed: &str) -> (Option<String>, Option<String>) {
    let rest = match trimmed.split_once("MAC Address:") {
        Some((_, rest)) => rest.trim(),
        None => return (None, None),
    };
    let (mac, tail) = match rest.split_once(char::is_whitespace) {
        Some((mac, tail)) => (mac, tail.trim()),
        None => (rest, ""),
    };
    let vendor = tail
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(tail)
        .trim();
    (
        Some(mac.to_string()),
        (!vendor.is_empty()).then(|| vendor.to_string()),
    )
}

fn ssh_service_from_port_line(trimmed: &str) -> Option<SshService> {
    let mut fields = trimmed.split_whitespace();
    let port = fields.next()?;
    let state = fields.next()?;
    let service = fields.next()?;
    if port != "22/tcp" || state != "open" || !service.contains("ssh") {
        return None;
    }
    let version = fields.collect::<Vec<_>>().join(" ");
    Some(SshService {
        available: true,
        port: 22,
        version: (!version.is_empty()).then_some(version),
    })
}

fn apply_os_line(builder: &mut DeviceBuilder, trimmed: &str) {
    builder.os_lines.push(trimmed.to_string());

    if let Some(details) = trimmed.strip_prefix("OS details:") {
        if builder.os_name.is_none() {
            builder.os_name = Some(details.trim().to_string());
        }
    } else if let Some(guesses) = trimmed.strip_prefix("Aggressive OS guesses:") {
        if builder.os_guess.is_none() {
            let first = guesses.split(", ").next().unwrap_or("").trim();
            let name = first.split(" (").next().unwrap_or(first).trim();
            if !name.is_empty() {
                builder.os_guess = Some(name.to_string());
            }
        }
    }

    // First match wins, even when a later guess is more specific.
    if builder.accuracy.is_none()
        && (trimmed.starts_with("Aggressive OS guesses:") || trimmed.contains("Accuracy:"))
    {
        builder.accuracy = patterns()
            .percentage
            .captures(trimmed)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u8>().ok());
    }
}

/// Parses raw scan output into every device record (any status), in output order.
pub fn parse_all(raw: &str) -> Vec<DeviceRecord> {
    let mut parser = OutputParser::new();
    for line in raw.lines() {
        parser.feed_line(line);
    }
    parser.finish()
}

/// Groups devices by vendor label.
pub fn group_by_vendor(devices: Vec<DeviceRecord>) -> GroupedDevices {
    let mut grouped = GroupedDevices::new();
    for device in devices {
        grouped
            .entry(device.vendor_key().to_string())
            .or_default()
            .push(device);
    }
    grouped
}

/// Parses raw scan output, keeps only hosts confirmed up, and groups them by vendor.
pub fn parse(raw: &str) -> GroupedDevices {
    let all = parse_all(raw);
    let total = all.len();
    let up: Vec<DeviceRecord> = all.into_iter().filter(DeviceRecord::is_up).collect();
    debug!("Parsed {} report(s), {} host(s) up", total, up.len());
    group_by_vendor(up)
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;

    const FULL_SCAN: &str = "\
Starting Nmap 7.94 ( https://nmap.org ) at 2024-05-01 10:00 UTC
Nmap scan report for router.lan (192.168.1.1)
Host is up (0.0012s latency).
Not shown: 997 closed tcp ports (reset)
PORT     STATE SERVICE VERSION
22/tcp   open  ssh     OpenSSH 8.2p1 Ubuntu 4ubuntu0.5 (Ubuntu Linux; protocol 2.0)
| ssh-auth-methods:
|   Supported authentication methods:
|     publickey
|_    password
80/tcp   open  http    lighttpd
MAC Address: 00:11:22:33:44:55 (Netgear)
Device type: general purpose
Running: Linux 4.X|5.X
OS CPE: cpe:/o:linux:linux_kernel:4 cpe:/o:linux:linux_kernel:5
OS details: Linux 4.15 - 5.6
Network Distance: 1 hop
Service Info: OS: Linux; CPE: cpe:/o:linux:linux_kernel

Nmap scan report for 192.168.1.20
Host is up (0.0050s latency).
All 1000 scanned ports on 192.168.1.20 are in ignored states.
MAC Address: AA:BB:CC:DD:EE:FF (Raspberry Pi Foundation)
Aggressive OS guesses: Linux 5.0 - 5.4 (95%), Linux 4.19 (93%)
No exact OS matches for host (test conditions non-ideal).

Nmap scan report for 192.168.1.30
Host is up (0.0031s latency).
8080/tcp open  http-proxy

Nmap scan report for 192.168.1.40
Note: Host seems down.

OS and Service detection performed. Please report any incorrect results at https://nmap.org/submit/ .
Nmap done: 256 IP addresses (3 hosts up) scanned in 12.34 seconds
";

    #[test]
    fn test_empty_input_yields_empty_map() {
        assert!(parse("").is_empty());
        assert!(parse("\n\n   \n").is_empty());
    }

    #[test]
    fn test_end_to_end_single_device() {
        let raw = "Nmap scan report for 10.0.0.5\nHost is up (0.002s latency).\n22/tcp open ssh\nMAC Address: 00:11:22:33:44:55 (Acme)\n";
        let grouped = parse(raw);

        assert_eq!(grouped.len(), 1);
        let devices = &grouped["Acme"];
        assert_eq!(devices.len(), 1);
        let d = &devices[0];
        assert_eq!(d.ip, "10.0.0.5");
        assert_eq!(d.status, DeviceStatus::Up);
        assert_eq!(d.latency, Some(0.002));
        assert!(d.ssh_available);
        assert_eq!(d.mac.as_deref(), Some("00:11:22:33:44:55"));
        assert_eq!(d.vendor.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_mac_line_populates_mac_info() {
        let raw = "Nmap scan report for 10.0.0.7\nHost is up.\nMAC Address: AA:BB:CC:DD:EE:FF (VendorX)\n";
        let grouped = parse(raw);
        let d = &grouped["VendorX"][0];
        assert_eq!(d.mac.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(d.vendor.as_deref(), Some("VendorX"));
        let info = d.mac_info.as_ref().expect("macInfo derived");
        assert!(info.available);
        assert_eq!(info.address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(info.vendor, "VendorX");
        assert_eq!(d.latency, None);
    }

    #[test]
    fn test_mac_fallback_for_odd_format() {
        // Dotted Cisco-style MACs are outside the primary pattern.
        let raw = "Nmap scan report for 10.0.0.8\nHost is up.\nMAC Address: 0011.2233.4455 (Cisco)\n";
        let grouped = parse(raw);
        let d = &grouped["Cisco"][0];
        assert_eq!(d.mac.as_deref(), Some("0011.2233.4455"));
        assert!(d.mac_info.as_ref().unwrap().available);
    }

    #[test]
    fn test_ssh_port_line_with_version() {
        let raw = "Nmap scan report for 10.0.0.9\nHost is up.\n22/tcp open ssh OpenSSH 8.2\n";
        let grouped = parse(raw);
        let d = &grouped[UNKNOWN_VENDOR][0];
        assert!(d.ssh_available);
        let ssh = d.ssh.as_ref().unwrap();
        assert!(ssh.available);
        assert_eq!(ssh.port, 22);
        assert_eq!(ssh.version.as_deref(), Some("OpenSSH 8.2"));
        assert_eq!(d.ssh_service, d.ssh);
        assert_eq!(d.ports, vec!["22/tcp open ssh OpenSSH 8.2"]);
    }

    #[test]
    fn test_closed_or_other_ssh_ports_do_not_count() {
        let raw = "Nmap scan report for 10.0.0.10\nHost is up.\n22/tcp filtered ssh\n2222/tcp open ssh\n";
        let grouped = parse(raw);
        let d = &grouped[UNKNOWN_VENDOR][0];
        assert!(!d.ssh_available);
        assert!(d.ssh.is_none());
        assert_eq!(d.ports.len(), 2);
    }

    #[test]
    fn test_full_scan_fixture() {
        let grouped = parse(FULL_SCAN);
        let total: usize = grouped.values().map(Vec::len).sum();
        assert_eq!(total, 3, "the host that seems down is dropped");

        let router = &grouped["Netgear"][0];
        assert_eq!(router.ip, "192.168.1.1");
        assert_eq!(router.hostname.as_deref(), Some("router.lan"));
        assert_eq!(router.ports.len(), 2);
        assert_eq!(router.ssh_auth_methods, vec!["publickey", "password"]);
        let os = router.os_details.as_ref().unwrap();
        assert_eq!(os.name.as_deref(), Some("Linux 4.15 - 5.6"));
        assert_eq!(os.accuracy, None);
        let info = router.os_info.as_ref().unwrap();
        assert!(info.available);
        assert_eq!(info.full.len(), 6);
        assert_eq!(router.raw_os_info, info.full);

        let pi = &grouped["Raspberry Pi Foundation"][0];
        let os = pi.os_details.as_ref().unwrap();
        assert_eq!(os.name.as_deref(), Some("Linux 5.0 - 5.4"));
        assert_eq!(os.accuracy, Some(95));

        let unknown = &grouped[UNKNOWN_VENDOR];
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].ip, "192.168.1.30");
        assert!(unknown[0].mac.is_none());
        assert!(unknown[0].mac_info.is_none());
    }

    #[test]
    fn test_device_count_bounded_by_headers() {
        let headers = FULL_SCAN.matches("scan report for").count();
        let all = parse_all(FULL_SCAN);
        assert_eq!(all.len(), headers);
        let up: usize = parse(FULL_SCAN).values().map(Vec::len).sum();
        assert!(up <= headers);
    }

    #[test]
    fn test_accuracy_first_match_wins() {
        let raw = "Nmap scan report for 10.0.0.11\nHost is up.\nAggressive OS guesses: Linux 3.2 (88%), Linux 5.4 (97%)\nAccuracy: 99%\n";
        let d = &parse(raw)[UNKNOWN_VENDOR][0];
        assert_eq!(d.os_details.as_ref().unwrap().accuracy, Some(88));
    }

    #[test]
    fn test_auth_block_ends_on_non_script_line() {
        let raw = "Nmap scan report for 10.0.0.12\nHost is up.\n22/tcp open ssh\n| ssh-auth-methods: \n|   Supported authentication methods: \n|     publickey\n80/tcp open http\n";
        let d = &parse(raw)[UNKNOWN_VENDOR][0];
        assert_eq!(d.ssh_auth_methods, vec!["publickey"]);
        // The line that closed the block is still processed as a port line.
        assert_eq!(d.ports, vec!["22/tcp open ssh", "80/tcp open http"]);
    }

    #[test]
    fn test_state_transitions() {
        let mut parser = OutputParser::new();
        assert_eq!(parser.state(), ParserState::Idle);
        parser.feed_line("Starting Nmap 7.94");
        assert_eq!(parser.state(), ParserState::Idle);
        parser.feed_line("Nmap scan report for 10.0.0.1");
        assert_eq!(parser.state(), ParserState::InDevice);
        parser.feed_line("| ssh-auth-methods: ");
        assert_eq!(parser.state(), ParserState::InAuthMethods);
        parser.feed_line("|_    password");
        assert_eq!(parser.state(), ParserState::InDevice);
        parser.feed_line("Running: Linux 5.X");
        assert_eq!(parser.state(), ParserState::InOsBlock);
        parser.feed_line("Nmap scan report for 10.0.0.2");
        assert_eq!(parser.state(), ParserState::InDevice);
        parser.feed_line("Nmap done: 2 IP addresses");
        assert_eq!(parser.state(), ParserState::Idle);
        assert_eq!(parser.finish().len(), 2);
    }

    #[test]
    fn test_crlf_input() {
        let raw = "Nmap scan report for 10.0.0.13\r\nHost is up (0.010s latency).\r\nMAC Address: 00:11:22:33:44:66 (Acme)\r\n";
        let grouped = parse(raw);
        assert_eq!(grouped["Acme"][0].latency, Some(0.010));
    }
}
