//! Telemetry event sink
//!
//! Absorbed failures (degraded storage, summarizer fallback, corrupt records)
//! stay observable through a fire-and-forget [`EventSink`]. Emitting is never
//! on the critical path and never fails the operation that produced the event.

use std::sync::Arc;

/// Fire-and-forget telemetry sink
pub trait EventSink: Send + Sync {
    /// Emit one named event with flat string attributes
    fn emit(&self, event: &str, attributes: Vec<(String, String)>);
}

/// Sink that drops every event
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: &str, _attributes: Vec<(String, String)>) {}
}

/// Sink that forwards events to the `tracing` subscriber
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &str, attributes: Vec<(String, String)>) {
        let detail = attributes
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");

        tracing::info!(event = event, %detail, "memory event");
    }
}

/// Sink that records events in memory (for tests/demos)
#[derive(Default)]
pub struct RecordingEventSink {
    events: parking_lot::Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl RecordingEventSink {
    /// Create an empty recording sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle, convenient for injecting into a config
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Names of all recorded events, in emission order
    pub fn event_names(&self) -> Vec<String> {
        self.events.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    /// Whether an event with the given name was emitted
    pub fn saw(&self, event: &str) -> bool {
        self.events.lock().iter().any(|(n, _)| n == event)
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &str, attributes: Vec<(String, String)>) {
        self.events.lock().push((event.to_string(), attributes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink() {
        let sink = RecordingEventSink::new();
        sink.emit("durable_write_failed", vec![("attempts".into(), "3".into())]);
        sink.emit("compression_fallback", vec![]);

        assert!(sink.saw("durable_write_failed"));
        assert!(!sink.saw("unknown"));
        assert_eq!(sink.event_names().len(), 2);
    }
}
