//! Per-client event type filters.

use serde::{Deserialize, Serialize};

use crate::event::EventType;

/// A client's event type filter, parsed once at stream open.
///
/// A client with no filter accepts every event type. A filter accepts an
/// event of type `t` iff `t` is `connected` or the filter pattern equals the
/// type's wire name case-insensitively. The historical alias `update` is
/// normalized to `dataUpdate` when the filter is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pattern: String,
}

impl EventFilter {
    /// Parse a filter string from the connect query, applying the
    /// `update` -> `dataUpdate` alias. Returns `None` for blank input,
    /// which means "accept everything".
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let pattern = if trimmed.eq_ignore_ascii_case("update") {
            EventType::DataUpdate.as_str().to_string()
        } else {
            trimmed.to_string()
        };
        Some(Self { pattern })
    }

    /// Whether an event of the given type passes this filter.
    #[must_use]
    pub fn accepts(&self, event_type: EventType) -> bool {
        event_type == EventType::Connected
            || self.pattern.eq_ignore_ascii_case(event_type.as_str())
    }

    /// The normalized pattern this filter matches against.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}
