//! driftwire-core: event model for the driftwire SSE fan-out service
//!
//! This crate provides the types shared by every driftwire component:
//!
//! - **Event records** - [`EventRecord`] and [`EventType`], the unit that
//!   flows from publishers through the outbox to client streams
//! - **Filters** - [`EventFilter`] for per-client event type selection
//! - **Typed payloads** - [`EventPayload`] and the concrete payload schemas
//!   carried in an event's `data` field
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   publish    ┌─────────────┐   poll    ┌──────────────┐
//! │ Publisher  │─────────────▶│   Outbox    │──────────▶│  Dispatcher  │
//! └────────────┘  (seq, id)   │ (ordered)   │  (seq ▲)  └──────┬───────┘
//!                             └─────────────┘                  │ filter
//!                                                              ▼
//!                                                     ┌─────────────────┐
//!                                                     │ client streams  │
//!                                                     └─────────────────┘
//! ```

pub mod event;
pub mod filter;
pub mod payload;

pub use event::{EventRecord, EventType, ParseEventTypeError};
pub use filter::EventFilter;
pub use payload::{
    AlertPayload, AlertSeverity, DataUpdatePayload, EventPayload, HeartbeatPayload,
    NotificationPayload, NotificationSeverity, PAYLOAD_VERSION, PayloadMeta,
};
