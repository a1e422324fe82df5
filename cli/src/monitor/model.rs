//! # Monitoring Data Model
//!
//! File: cli/src/monitor/model.rs
//!
//! ## Overview
//!
//! Plain data types shared by the parser, the probes, the history store and the
//! progress sink. Everything serializes with camelCase keys so the JSON matches what
//! dashboard consumers already read (`macInfo`, `sshAvailable`, `rawOSInfo`, ...).
//!
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Devices grouped by vendor label (`"Unknown"` when no vendor was reported).
pub type GroupedDevices = BTreeMap<String, Vec<DeviceRecord>>;

/// Vendor key used for devices without a MAC vendor.
pub const UNKNOWN_VENDOR: &str = "Unknown";

/// Reachability as confirmed by the scan tool.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Unknown,
    Up,
}

/// One host discovered in a single scan pass. Built by the parser, never mutated afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub status: DeviceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_info: Option<MacInfo>,
    /// Raw port lines, verbatim and in scan order.
    pub ports: Vec<String>,
    pub ssh_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_service: Option<SshService>,
    /// Same value as `ssh_service`, kept for older consumers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshService>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_details: Option<OsDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_info: Option<OsInfo>,
    #[serde(rename = "rawOSInfo", skip_serializing_if = "Vec::is_empty", default)]
    pub raw_os_info: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub ssh_auth_methods: Vec<String>,
    /// Seconds, as reported by `Host is up (Xs latency)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
}

impl DeviceRecord {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ..Default::default()
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == DeviceStatus::Up
    }

    /// Grouping key for this device.
    pub fn vendor_key(&self) -> &str {
        self.vendor.as_deref().unwrap_or(UNKNOWN_VENDOR)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MacInfo {
    pub available: bool,
    pub address: String,
    pub vendor: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SshService {
    pub available: bool,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OsDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OsInfo {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<u8>,
    pub full: Vec<String>,
}

/// Result of the latency probe. `latency` is the average round trip in milliseconds.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LatencyResult {
    pub latency: Option<f64>,
    pub alive: bool,
    pub packet_loss: f64,
}

impl LatencyResult {
    pub fn offline() -> Self {
        Self {
            latency: None,
            alive: false,
            packet_loss: 100.0,
        }
    }
}

/// Which bandwidth tier produced a measurement. Only `Iperf3` is a real measurement.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandwidthSource {
    #[serde(rename = "iperf3")]
    Iperf3,
    #[serde(rename = "curl-fallback")]
    CurlFallback,
    #[serde(rename = "simulated")]
    Simulated,
}

impl BandwidthSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BandwidthSource::Iperf3 => "iperf3",
            BandwidthSource::CurlFallback => "curl-fallback",
            BandwidthSource::Simulated => "simulated",
        }
    }
}

impl std::fmt::Display for BandwidthSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bandwidth in Mbps plus the tier that produced it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BandwidthResult {
    pub download: f64,
    pub upload: f64,
    pub source: BandwidthSource,
}

/// Result of the remote uptime probe. Failures are values, not errors.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UptimeResult {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl UptimeResult {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// Up/down observation for the uptime series.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    Up,
    Down,
}

/// Everything measured for one IP in one sweep pass. Optional parts are absent when the
/// host was not alive.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetrics {
    pub latency: LatencyResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<BandwidthResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<UptimeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
}

/// A measurement tagged with the IP it belongs to, serialized flat (`{ip, ...}`).
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct IpMetric<T> {
    pub ip: String,
    #[serde(flatten)]
    pub value: T,
}

/// Final aggregate of a performance sweep, in input IP order.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct SweepSummary {
    pub latency: Vec<IpMetric<LatencyResult>>,
    pub bandwidth: Vec<IpMetric<BandwidthResult>>,
    pub uptime: Vec<IpMetric<UptimeResult>>,
}

/// Credentials for the remote uptime probe.
#[derive(Debug, Clone)]
pub struct SshCredentials {
    pub username: String,
    pub password: Option<String>,
}
