//! Typed payload schemas carried in an event's `data` field.
//!
//! Every payload carries `messageId`, `timestamp`, `version`, and a `type`
//! discriminator. The discriminator doubles as the event type's wire name so
//! a decoded payload is self-describing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schema version stamped into every typed payload.
pub const PAYLOAD_VERSION: &str = "1.0";

/// Severity levels for notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSeverity {
    Info,
    Warning,
    Error,
}

/// Severity levels for alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    High,
    Medium,
    Low,
}

/// Shared metadata stamped into every typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadMeta {
    /// Unique payload id. Decorative: clients deduplicate by the outer
    /// event id, not this field.
    pub message_id: Uuid,
    /// When the payload was built (UTC).
    pub timestamp: DateTime<Utc>,
    /// Schema version, currently [`PAYLOAD_VERSION`].
    pub version: String,
}

impl PayloadMeta {
    fn stamp() -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            version: PAYLOAD_VERSION.to_string(),
        }
    }
}

/// Notification payload: a message with an informational severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    #[serde(flatten)]
    pub meta: PayloadMeta,
    pub message: String,
    pub severity: NotificationSeverity,
}

impl NotificationPayload {
    #[must_use]
    pub fn new(message: impl Into<String>, severity: NotificationSeverity) -> Self {
        Self {
            meta: PayloadMeta::stamp(),
            message: message.into(),
            severity,
        }
    }
}

/// Data update payload: a change to a named entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataUpdatePayload {
    #[serde(flatten)]
    pub meta: PayloadMeta,
    pub entity_id: String,
    pub entity_type: String,
    pub changes: serde_json::Value,
}

impl DataUpdatePayload {
    #[must_use]
    pub fn new(
        entity_id: impl Into<String>,
        entity_type: impl Into<String>,
        changes: serde_json::Value,
    ) -> Self {
        Self {
            meta: PayloadMeta::stamp(),
            entity_id: entity_id.into(),
            entity_type: entity_type.into(),
            changes,
        }
    }
}

/// Alert payload: an operational alert with severity and category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    #[serde(flatten)]
    pub meta: PayloadMeta,
    pub message: String,
    pub severity: AlertSeverity,
    pub category: String,
}

impl AlertPayload {
    #[must_use]
    pub fn new(
        message: impl Into<String>,
        severity: AlertSeverity,
        category: impl Into<String>,
    ) -> Self {
        Self {
            meta: PayloadMeta::stamp(),
            message: message.into(),
            severity,
            category: category.into(),
        }
    }
}

/// Heartbeat payload: metadata only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    #[serde(flatten)]
    pub meta: PayloadMeta,
}

impl HeartbeatPayload {
    #[must_use]
    pub fn new() -> Self {
        Self {
            meta: PayloadMeta::stamp(),
        }
    }
}

impl Default for HeartbeatPayload {
    fn default() -> Self {
        Self::new()
    }
}

/// A typed payload, tagged by the event type's wire name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventPayload {
    Notification(NotificationPayload),
    DataUpdate(DataUpdatePayload),
    Alert(AlertPayload),
    Heartbeat(HeartbeatPayload),
}

impl EventPayload {
    /// Serialize to the compact JSON text stored in an event's `data` field.
    ///
    /// Infallible for these schemas: every field serializes to valid JSON.
    #[must_use]
    pub fn to_data(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
