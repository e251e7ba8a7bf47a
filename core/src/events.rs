//! Lifecycle log events
//!
//! Backends report notable transitions (client opened, timeouts, refused
//! connections...) through an [`EventSink`]. The default sink forwards them
//! to `tracing`; embedders can plug in their own to surface them elsewhere.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Kind of lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    ClientInitialized,
    ClientClosed,
    TimeoutWarning,
    ConnectionRefused,
    AuthFailed,
    UnexpectedError,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::ClientInitialized => "client-initialized",
            EventKind::ClientClosed => "client-closed",
            EventKind::TimeoutWarning => "timeout-warning",
            EventKind::ConnectionRefused => "connection-refused",
            EventKind::AuthFailed => "auth-failed",
            EventKind::UnexpectedError => "unexpected-error",
        };
        f.write_str(s)
    }
}

/// A single lifecycle event
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub kind: EventKind,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl LogEvent {
    pub fn new(kind: EventKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            at: Utc::now(),
        }
    }
}

/// Receiver of lifecycle events
pub trait EventSink: Send + Sync {
    fn log_event(&self, event: LogEvent);
}

/// Shared handle to an event sink
pub type Events = Arc<dyn EventSink>;

/// Emit an event built from its parts
pub fn emit(sink: &dyn EventSink, kind: EventKind, detail: impl Into<String>) {
    sink.log_event(LogEvent::new(kind, detail));
}

/// Sink that writes every event to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn log_event(&self, event: LogEvent) {
        match event.kind {
            EventKind::ClientInitialized | EventKind::ClientClosed => {
                info!(event = %event.kind, "{}", event.detail)
            }
            EventKind::TimeoutWarning => warn!(event = %event.kind, "{}", event.detail),
            EventKind::ConnectionRefused | EventKind::AuthFailed | EventKind::UnexpectedError => {
                error!(event = %event.kind, "{}", event.detail)
            }
        }
    }
}

/// Sink that keeps events in memory, optionally forwarding them
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LogEvent>>,
    forward: Option<Events>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record events and also pass them on to `sink`
    pub fn forwarding_to(sink: Events) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            forward: Some(sink),
        }
    }

    /// Snapshot of the recorded events
    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Recorded event kinds, in order
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }

    /// Number of recorded events of `kind`
    pub fn count(&self, kind: EventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }
}

impl EventSink for RecordingSink {
    fn log_event(&self, event: LogEvent) {
        if let Some(forward) = &self.forward {
            forward.log_event(event.clone());
        }
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        emit(&sink, EventKind::ClientInitialized, "opened");
        emit(&sink, EventKind::TimeoutWarning, "slow");
        emit(&sink, EventKind::ClientClosed, "closed");

        assert_eq!(
            sink.kinds(),
            vec![
                EventKind::ClientInitialized,
                EventKind::TimeoutWarning,
                EventKind::ClientClosed
            ]
        );
        assert_eq!(sink.count(EventKind::TimeoutWarning), 1);
        assert_eq!(sink.events()[0].detail, "opened");
    }

    #[test]
    fn test_forwarding_sink() {
        let inner = Arc::new(RecordingSink::new());
        let outer = RecordingSink::forwarding_to(inner.clone());
        emit(&outer, EventKind::AuthFailed, "bad password");
        assert_eq!(inner.kinds(), vec![EventKind::AuthFailed]);
        assert_eq!(outer.kinds(), vec![EventKind::AuthFailed]);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(EventKind::TimeoutWarning.to_string(), "timeout-warning");
        assert_eq!(EventKind::AuthFailed.to_string(), "auth-failed");
    }
}
