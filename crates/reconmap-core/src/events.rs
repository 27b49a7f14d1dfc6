//! Event types for health and scan lifecycle notifications.
//!
//! Events are published on an in-process broadcast bus and consumed by the
//! scan view (banner, progress line) and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ScanMode, ScanStatus};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// An event emitted by a reconmap component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
    pub payload: EventPayload,
}

impl ReconEvent {
    pub fn new(source: EventSource, payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            source,
            payload,
        }
    }
}

/// Which component emitted the event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Health,
    Lifecycle,
}

/// The event payload, tagged by type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type")]
pub enum EventPayload {
    // ── Health events ─────────────────────────────────────────
    /// The backend stopped answering liveness probes.
    BackendUnreachable { url: String },
    /// The backend answered again after being unreachable.
    BackendRestored { url: String },

    // ── Scan lifecycle events ─────────────────────────────────
    /// The backend accepted a scan.
    ScanSubmitted {
        scan_id: String,
        target: String,
        mode: ScanMode,
    },
    /// A non-terminal status update arrived.
    ScanProgress {
        scan_id: String,
        status: ScanStatus,
        elapsed_ms: u64,
    },
    /// The scan finished and its hosts were merged into the topology.
    ScanCompleted {
        scan_id: String,
        hosts: u32,
        findings: u32,
        duration_ms: u64,
    },
    /// The scan ended in failure.
    ScanFailed {
        scan_id: Option<String>,
        error: String,
        hint: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_roundtrip() {
        let event = ReconEvent::new(
            EventSource::Lifecycle,
            EventPayload::ScanSubmitted {
                scan_id: "abc".to_string(),
                target: "10.0.0.0/24".to_string(),
                mode: ScanMode::Quick,
            },
        );

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: ReconEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, deserialized.id);
        assert_eq!(event.payload, deserialized.payload);
    }

    #[test]
    fn event_payload_tags() {
        let payload = EventPayload::BackendUnreachable {
            url: "http://localhost:5000/".to_string(),
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"event_type\":\"BackendUnreachable\""));
    }
}
