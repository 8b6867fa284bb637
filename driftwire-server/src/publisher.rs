//! Synchronous-to-durability event publisher.
//!
//! `publish` only returns once the entry is in the outbox: a caller that
//! observed success knows the event will be delivered. A sequence number
//! allocated for a publish that ultimately fails is abandoned, leaving a gap
//! in the outbox; readers tolerate gaps, reordering they could not.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use driftwire_core::{EventRecord, EventType};
use driftwire_store::{OutboxEntry, OutboxStore, SequenceAllocator, StoreError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::FanoutConfig;

/// Errors surfaced to publish callers.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The sequence allocator stayed unavailable through the retry budget.
    #[error("failed to allocate sequence number: {0}")]
    Sequence(#[source] StoreError),

    /// The outbox write failed after the retry budget, or fatally.
    #[error("publish of seq {seq} failed: {source}")]
    Failed {
        seq: i64,
        #[source]
        source: StoreError,
    },
}

/// Accepts event submissions and writes them durably to the outbox.
pub struct Publisher {
    sequences: Arc<dyn SequenceAllocator>,
    outbox: Arc<dyn OutboxStore>,
    retries: u32,
    initial_backoff: Duration,
    event_ttl: Duration,
}

impl Publisher {
    /// Create a publisher over the given stores.
    pub fn new(
        sequences: Arc<dyn SequenceAllocator>,
        outbox: Arc<dyn OutboxStore>,
        config: &FanoutConfig,
    ) -> Self {
        Self {
            sequences,
            outbox,
            retries: config.publish_retries,
            initial_backoff: config.publish_backoff,
            event_ttl: config.event_ttl,
        }
    }

    /// Publish an event. Blocks until the entry is durably written and
    /// returns it, or fails with [`PublishError`] and the event is not
    /// published.
    pub async fn publish(
        &self,
        event_type: EventType,
        data: String,
        target: Option<String>,
    ) -> Result<OutboxEntry, PublishError> {
        let seq = self.allocate_seq().await?;

        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.event_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let entry = OutboxEntry {
            record: EventRecord {
                id: Uuid::new_v4().to_string(),
                event_type,
                data,
                seq,
                target,
            },
            created_at: now,
            ttl: now + ttl,
        };

        self.insert_with_retry(&entry).await?;
        debug!(seq, event_type = %event_type, "event published");
        Ok(entry)
    }

    async fn allocate_seq(&self) -> Result<i64, PublishError> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;
        loop {
            match self.sequences.next().await {
                Ok(seq) => return Ok(seq),
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "sequence allocation failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(PublishError::Sequence(e)),
            }
        }
    }

    async fn insert_with_retry(&self, entry: &OutboxEntry) -> Result<(), PublishError> {
        let seq = entry.seq();
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;
        loop {
            match self.outbox.insert(entry).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    warn!(seq, attempt, error = %e, "outbox insert failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                // A duplicate sequence is fatal for this publish; the
                // allocated seq is abandoned rather than reused.
                Err(e) => return Err(PublishError::Failed { seq, source: e }),
            }
        }
    }
}
