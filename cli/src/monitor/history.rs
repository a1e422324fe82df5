//! # Device History Store
//!
//! File: cli/src/monitor/history.rs
//!
//! ## Overview
//!
//! Bounded, in-memory time series of measurements, kept per IP address and per metric
//! kind (`latency`, `bandwidth`, `uptime`, `scanResults`). Each series holds at most
//! `max_items` entries (`MAX_HISTORY_ITEMS` by default); inserting into a full series
//! drops the oldest entry first.
//!
//! ## Architecture
//!
//! One `HistoryStore` instance is created by the orchestrator and shared through an
//! `Arc`. All writes go through a single mutex, which keeps append-then-trim atomic even
//! when several sweeps write concurrently. Nothing is persisted; history lives as long as
//! the process.
//!
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::model::{BandwidthResult, DeviceRecord, LatencyResult, Reachability};

/// Default number of entries retained per (ip, metric) series.
pub const MAX_HISTORY_ITEMS: usize = 100;

/// Series selector.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum MetricKind {
    Latency,
    Bandwidth,
    Uptime,
    ScanResults,
}

/// One up/down observation, optionally with the remote uptime string.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UptimeSample {
    pub status: Reachability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
}

/// Metric-specific payload of a history entry.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Metric {
    Latency(LatencyResult),
    Bandwidth(BandwidthResult),
    Uptime(UptimeSample),
    ScanResult(Box<DeviceRecord>),
}

impl Metric {
    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Latency(_) => MetricKind::Latency,
            Metric::Bandwidth(_) => MetricKind::Bandwidth,
            Metric::Uptime(_) => MetricKind::Uptime,
            Metric::ScanResult(_) => MetricKind::ScanResults,
        }
    }
}

/// `{timestamp, ...metric fields}`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub metric: Metric,
}

impl HistoryEntry {
    /// Entry stamped with the current time.
    pub fn now(metric: Metric) -> Self {
        Self {
            timestamp: Utc::now(),
            metric,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.metric.kind()
    }
}

type Series = HashMap<MetricKind, VecDeque<HistoryEntry>>;

/// Bounded per-IP, per-metric history.
#[derive(Debug)]
pub struct HistoryStore {
    max_items: usize,
    series: Mutex<HashMap<String, Series>>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(MAX_HISTORY_ITEMS)
    }
}

impl HistoryStore {
    pub fn new(max_items: usize) -> Self {
        Self {
            max_items: max_items.max(1),
            series: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    // A panic while holding the lock leaves the maps structurally valid, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Series>> {
        self.series.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends an entry to the series selected by its metric kind, trimming the oldest
    /// entries so the series never exceeds `max_items`.
    pub fn append(&self, ip: &str, entry: HistoryEntry) {
        let mut all = self.lock();
        let series = all
            .entry(ip.to_string())
            .or_default()
            .entry(entry.kind())
            .or_default();
        series.push_back(entry);
        while series.len() > self.max_items {
            series.pop_front();
        }
    }

    /// Appends `metric` stamped with the current time.
    pub fn record(&self, ip: &str, metric: Metric) {
        self.append(ip, HistoryEntry::now(metric));
    }

    /// Full retained series, oldest first. Empty when nothing was recorded.
    pub fn get(&self, ip: &str, kind: MetricKind) -> Vec<HistoryEntry> {
        self.lock()
            .get(ip)
            .and_then(|s| s.get(&kind))
            .map(|series| series.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, ip: &str, kind: MetricKind) -> Option<HistoryEntry> {
        self.lock()
            .get(ip)
            .and_then(|s| s.get(&kind))
            .and_then(|series| series.back().cloned())
    }

    /// Share of `up` observations in the uptime series, as a percentage rounded to two
    /// decimals. `None` when the series is empty.
    pub fn uptime_percentage(&self, ip: &str) -> Option<f64> {
        let all = self.lock();
        let series = all.get(ip)?.get(&MetricKind::Uptime)?;
        if series.is_empty() {
            return None;
        }
        let up = series
            .iter()
            .filter(|e| matches!(&e.metric, Metric::Uptime(s) if s.status == Reachability::Up))
            .count();
        let pct = up as f64 / series.len() as f64 * 100.0;
        Some((pct * 100.0).round() / 100.0)
    }

    /// IPs with any recorded history, sorted.
    pub fn ips(&self) -> Vec<String> {
        let mut ips: Vec<String> = self.lock().keys().cloned().collect();
        ips.sort();
        ips
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::model::BandwidthSource;
    use std::sync::Arc;

    fn latency(ms: f64) -> Metric {
        Metric::Latency(LatencyResult {
            latency: Some(ms),
            alive: true,
            packet_loss: 0.0,
        })
    }

    fn uptime(status: Reachability) -> Metric {
        Metric::Uptime(UptimeSample {
            status,
            uptime: None,
        })
    }

    #[test]
    fn test_trim_keeps_most_recent_entries() {
        let store = HistoryStore::default();
        for i in 0..150 {
            store.record("10.0.0.1", latency(i as f64));
        }
        let series = store.get("10.0.0.1", MetricKind::Latency);
        assert_eq!(series.len(), 100);
        let values: Vec<f64> = series
            .iter()
            .map(|e| match &e.metric {
                Metric::Latency(l) => l.latency.unwrap(),
                other => panic!("unexpected metric {:?}", other),
            })
            .collect();
        let expected: Vec<f64> = (50..150).map(|i| i as f64).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_series_are_independent_per_kind_and_ip() {
        let store = HistoryStore::new(3);
        store.record("10.0.0.1", latency(1.0));
        store.record(
            "10.0.0.1",
            Metric::Bandwidth(BandwidthResult {
                download: 10.0,
                upload: 2.0,
                source: BandwidthSource::Simulated,
            }),
        );
        store.record("10.0.0.2", latency(2.0));

        assert_eq!(store.get("10.0.0.1", MetricKind::Latency).len(), 1);
        assert_eq!(store.get("10.0.0.1", MetricKind::Bandwidth).len(), 1);
        assert_eq!(store.get("10.0.0.2", MetricKind::Latency).len(), 1);
        assert!(store.get("10.0.0.2", MetricKind::Uptime).is_empty());
        assert!(store.get("10.9.9.9", MetricKind::Latency).is_empty());
        assert_eq!(store.ips(), vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn test_uptime_percentage() {
        let store = HistoryStore::default();
        assert_eq!(store.uptime_percentage("10.0.0.3"), None);

        store.record("10.0.0.3", uptime(Reachability::Up));
        store.record("10.0.0.3", uptime(Reachability::Down));
        store.record("10.0.0.3", uptime(Reachability::Up));

        let pct = store.uptime_percentage("10.0.0.3").unwrap();
        assert!((pct - 66.67).abs() < 0.01, "got {}", pct);
    }

    #[test]
    fn test_latest() {
        let store = HistoryStore::default();
        store.record("10.0.0.4", latency(5.0));
        store.record("10.0.0.4", latency(7.0));
        let latest = store.latest("10.0.0.4", MetricKind::Latency).unwrap();
        assert_eq!(latest.metric, latency(7.0));
        assert!(store.latest("10.0.0.4", MetricKind::Uptime).is_none());
    }

    #[test]
    fn test_entry_serializes_flat() {
        let entry = HistoryEntry::now(uptime(Reachability::Down));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "down");
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn test_concurrent_writers_keep_bound() {
        let store = Arc::new(HistoryStore::new(50));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        store.record("10.0.0.5", latency((t * 1000 + i) as f64));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get("10.0.0.5", MetricKind::Latency).len(), 50);
    }
}
