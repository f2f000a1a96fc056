//! Access events and logging sinks
//!
//! One `AccessEvent` per intercepted call/get/set, handed to an
//! `EventSink` fire-and-forget: delivery never blocks the intercepted
//! call's return path, and a failed delivery never becomes page-visible.

use std::cell::RefCell;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// What kind of access was intercepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Call,
    Get,
    Set,
}

/// Outcome of the forwarded original call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum CallStatus {
    Ok,
    Threw { message: String },
}

/// A recorded observation of one intercepted access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessEvent {
    /// Realm the access happened in
    pub realm: String,
    /// Declared API root name (e.g. `Navigator`)
    pub api_root: String,
    /// Full property path (e.g. `Navigator.userAgent`)
    pub path: String,
    pub operation: Operation,
    /// Best-effort argument snapshots (calls and sets)
    #[serde(default)]
    pub arguments: Vec<serde_json::Value>,
    /// Best-effort return-value snapshot (calls and gets)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    pub status: CallStatus,
    /// Originating page script URL, when determinable from the stack
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_url: Option<String>,
    /// Sanitized stack text at the interception point
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Wall-clock milliseconds since the Unix epoch
    pub timestamp_ms: f64,
}

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

/// Destination for access events.
///
/// Implementations must not block: the wrapper calls `deliver` inline
/// with the intercepted call and relies on it returning immediately.
pub trait EventSink {
    fn deliver(&self, event: AccessEvent) -> Result<()>;
}

/// Sink backed by an unbounded channel toward the privileged logging
/// side. `deliver` is a plain send and never awaits.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<AccessEvent>,
}

impl ChannelSink {
    /// Create a sink plus the receiver the logging component drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AccessEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, event: AccessEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| Error::sink("logging channel closed"))
    }
}

/// In-process collecting sink, for tests and local drains
#[derive(Default)]
pub struct MemorySink {
    events: RefCell<Vec<AccessEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far
    pub fn events(&self) -> Vec<AccessEvent> {
        self.events.borrow().clone()
    }

    /// Drain everything delivered so far
    pub fn take(&self) -> Vec<AccessEvent> {
        self.events.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl EventSink for MemorySink {
    fn deliver(&self, event: AccessEvent) -> Result<()> {
        self.events.borrow_mut().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(path: &str) -> AccessEvent {
        AccessEvent {
            realm: "realm-0".to_string(),
            api_root: "Navigator".to_string(),
            path: path.to_string(),
            operation: Operation::Get,
            arguments: Vec::new(),
            value: Some(serde_json::Value::String("Mozilla/5.0".to_string())),
            status: CallStatus::Ok,
            script_url: Some("https://site.example/app.js".to_string()),
            stack: None,
            timestamp_ms: now_ms(),
        }
    }

    #[test]
    fn test_channel_sink_preserves_order() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.deliver(event("Navigator.userAgent")).unwrap();
        sink.deliver(event("Navigator.platform")).unwrap();

        assert_eq!(rx.try_recv().unwrap().path, "Navigator.userAgent");
        assert_eq!(rx.try_recv().unwrap().path, "Navigator.platform");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_sink_reports_closed_receiver() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        assert!(sink.deliver(event("Navigator.userAgent")).is_err());
    }

    #[test]
    fn test_channel_sink_drains_async() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.deliver(event("Navigator.userAgent")).unwrap();
        let received = tokio_test::block_on(rx.recv()).unwrap();
        assert_eq!(received.path, "Navigator.userAgent");
    }

    #[test]
    fn test_memory_sink_take_drains() {
        let sink = MemorySink::new();
        sink.deliver(event("Navigator.userAgent")).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.take().len(), 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_event_serialization_shape() {
        let json = serde_json::to_value(event("Navigator.userAgent")).unwrap();
        assert_eq!(json["operation"], "get");
        assert_eq!(json["status"]["outcome"], "ok");
        assert_eq!(json["path"], "Navigator.userAgent");
        // Absent optionals are omitted entirely
        assert!(json.get("stack").is_none());

        let threw = serde_json::to_value(CallStatus::Threw {
            message: "TypeError: bad args".to_string(),
        })
        .unwrap();
        assert_eq!(threw["outcome"], "threw");
        assert_eq!(threw["message"], "TypeError: bad args");
    }
}
