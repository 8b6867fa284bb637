//! Event records and the event type vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The recognized event kinds.
///
/// `Connected` is reserved for transport-level use; the core never publishes
/// it through the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    /// Generic broadcast message.
    Message,
    /// User-facing notification with a severity.
    Notification,
    /// Entity change notification.
    DataUpdate,
    /// Operational alert with severity and category.
    Alert,
    /// Periodic liveness event.
    Heartbeat,
    /// Reserved transport-level kind, never sequenced by the core.
    Connected,
}

impl EventType {
    /// Wire name of this event type, as written on the SSE `event:` line.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Message => "message",
            EventType::Notification => "notification",
            EventType::DataUpdate => "dataUpdate",
            EventType::Alert => "alert",
            EventType::Heartbeat => "heartbeat",
            EventType::Connected => "connected",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a recognized event type.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unrecognized event type: {0}")]
pub struct ParseEventTypeError(pub String);

impl FromStr for EventType {
    type Err = ParseEventTypeError;

    /// Case-insensitive parse of a wire name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "message" => Ok(EventType::Message),
            "notification" => Ok(EventType::Notification),
            "dataupdate" => Ok(EventType::DataUpdate),
            "alert" => Ok(EventType::Alert),
            "heartbeat" => Ok(EventType::Heartbeat),
            "connected" => Ok(EventType::Connected),
            _ => Err(ParseEventTypeError(s.to_string())),
        }
    }
}

/// An in-flight event: the unit handed from the poller to client streams.
///
/// `seq` is assigned once at publish time and defines the global delivery
/// order. `id` is opaque to the core and is the key clients deduplicate by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Unique event id, written as the SSE `id:` line.
    pub id: String,
    /// Event kind, written as the SSE `event:` line.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Opaque JSON text payload.
    pub data: String,
    /// Globally monotonic sequence number.
    pub seq: i64,
    /// Target client id for point-to-point events; `None` broadcasts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl EventRecord {
    /// True when this event is addressed to a single client.
    #[must_use]
    pub fn is_targeted(&self) -> bool {
        self.target.is_some()
    }
}
