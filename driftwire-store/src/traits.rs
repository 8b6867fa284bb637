//! Core traits for outbox, sequence, and checkpoint storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use driftwire_core::EventRecord;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A persisted outbox entry: an event record plus retention metadata.
/// Entries are immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// The event as delivered to clients.
    pub record: EventRecord,
    /// When the entry was written (UTC).
    pub created_at: DateTime<Utc>,
    /// Instant after which the entry may be reaped.
    pub ttl: DateTime<Utc>,
}

impl OutboxEntry {
    /// Sequence number of the contained event.
    #[must_use]
    pub fn seq(&self) -> i64 {
        self.record.seq
    }
}

/// A client's persisted delivery position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Client this checkpoint belongs to.
    pub client_id: String,
    /// Highest sequence number yielded to this client's transport.
    pub last_seq: i64,
    /// Id of the last yielded event, if known.
    pub last_event_id: Option<String>,
    /// Last time the checkpoint advanced.
    pub updated_at: DateTime<Utc>,
}

/// Durable, append-only, globally-ordered event log.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Persist an immutable entry. Fails with
    /// [`StoreError::DuplicateSequence`](crate::StoreError::DuplicateSequence)
    /// if an entry with the same sequence number already exists.
    async fn insert(&self, entry: &OutboxEntry) -> Result<()>;

    /// Up to `limit` entries with `seq > from_seq`, ascending by `seq`.
    /// Readers must tolerate reaped ranges: missing sequence numbers are
    /// skipped, not errors.
    async fn read_after(&self, from_seq: i64, limit: usize) -> Result<Vec<OutboxEntry>>;

    /// The entry with the highest sequence number, if any.
    async fn latest(&self) -> Result<Option<OutboxEntry>>;

    /// Delete entries whose TTL is before `now`. Returns the reaped count.
    async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Atomic issuance of the next global sequence number.
#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    /// Strictly increasing across all callers in all processes. The first
    /// invocation ever returns 1.
    async fn next(&self) -> Result<i64>;
}

/// Per-client persistent delivery checkpoints, one row per client id.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The checkpoint for a client id, if one has been written.
    async fn get(&self, client_id: &str) -> Result<Option<Checkpoint>>;

    /// Upsert the client's checkpoint to `seq`. The stored `last_seq` is
    /// monotonic: a call with a lower sequence than the stored one leaves
    /// the position unchanged.
    async fn advance(&self, client_id: &str, seq: i64, event_id: Option<&str>) -> Result<()>;
}
