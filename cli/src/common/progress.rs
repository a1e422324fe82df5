//! # Progress Reporting
//!
//! File: cli/src/common/progress.rs
//!
//! ## Overview
//!
//! Scans and sweeps report what they are doing through a caller-supplied
//! `ProgressSink`. The engine never prints; the command layer decides where events go.
//!
//! Events serialize as tagged JSON objects, one per line when written by
//! `JsonLinesSink`:
//!
//! ```text
//! {"type":"status","message":"Scanning 192.168.1.0/24"}
//! {"type":"partialUpdate","ip":"192.168.1.10","metrics":{"latency":{...}}}
//! {"type":"data","kind":"sshDevices","data":[...]}
//! {"type":"error","ip":"192.168.1.20","message":"..."}
//! ```
//!
//! ## Architecture
//!
//! - `ChannelSink`: forwards into a tokio unbounded channel (consumed by a printer task).
//! - `JsonLinesSink`: writes straight to any `Write`, normally stdout.
//! - `RecordingSink`: keeps events in memory for assertions.
//!
use crate::monitor::model::{DeviceMetrics, DeviceRecord, GroupedDevices, SweepSummary};
use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

/// Payload of a `data` event.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum DataPayload {
    Devices(GroupedDevices),
    SshDevices(Vec<DeviceRecord>),
    Sweep(SweepSummary),
}

#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgressEvent {
    Status {
        message: String,
    },
    /// Raw scan output as it streams in.
    Output {
        chunk: String,
    },
    PartialUpdate {
        ip: String,
        metrics: DeviceMetrics,
    },
    Data(DataPayload),
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        ip: Option<String>,
        message: String,
    },
}

impl ProgressEvent {
    pub fn status(message: impl Into<String>) -> Self {
        ProgressEvent::Status {
            message: message.into(),
        }
    }

    pub fn error(ip: Option<&str>, message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            ip: ip.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Receiver of engine progress. `emit` must not block for long.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Sends events into a channel. A closed receiver silently drops events.
pub struct ChannelSink {
    tx: UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// Writes each event as one JSON line.
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
    include_output: bool,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// `include_output = false` drops raw scan chunks, which are noisy on a terminal.
    pub fn new(out: W, include_output: bool) -> Self {
        Self {
            out: Mutex::new(out),
            include_output,
        }
    }
}

impl<W: Write + Send> ProgressSink for JsonLinesSink<W> {
    fn emit(&self, event: ProgressEvent) {
        if !self.include_output && matches!(event, ProgressEvent::Output { .. }) {
            return;
        }
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let written = serde_json::to_writer(&mut *out, &event)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(out))
            .and_then(|_| out.flush());
        if let Err(e) = written {
            warn!("Failed to write progress event: {}", e);
        }
    }
}

/// Keeps every event, in order.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
impl ProgressSink for RecordingSink {
    fn emit(&self, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::model::LatencyResult;

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(ProgressEvent::status("scanning")).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["message"], "scanning");

        let json = serde_json::to_value(ProgressEvent::Data(DataPayload::SshDevices(vec![])))
            .unwrap();
        assert_eq!(json["type"], "data");
        assert_eq!(json["kind"], "sshDevices");
        assert!(json["data"].as_array().unwrap().is_empty());

        let json = serde_json::to_value(ProgressEvent::error(None, "boom")).unwrap();
        assert_eq!(json["type"], "error");
        assert!(json.get("ip").is_none());
    }

    #[test]
    fn test_partial_update_shape() {
        let event = ProgressEvent::PartialUpdate {
            ip: "10.0.0.1".into(),
            metrics: DeviceMetrics {
                latency: LatencyResult::offline(),
                bandwidth: None,
                uptime: None,
                connected: None,
            },
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["type"], "partialUpdate");
        assert_eq!(json["metrics"]["latency"]["alive"], false);
        assert_eq!(json["metrics"]["latency"]["packetLoss"], 100.0);
    }

    #[test]
    fn test_json_lines_sink_writes_one_line_per_event() {
        let sink = JsonLinesSink::new(Vec::new(), false);
        sink.emit(ProgressEvent::status("a"));
        sink.emit(ProgressEvent::Output {
            chunk: "raw".into(),
        });
        sink.emit(ProgressEvent::status("b"));

        let buf = sink.out.into_inner().unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("\"b\""));
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        sink.emit(ProgressEvent::status("hello"));
        match rx.try_recv().unwrap() {
            ProgressEvent::Status { message } => assert_eq!(message, "hello"),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
