//! In-memory store implementation for testing and development.
//!
//! Implements all three storage contracts in one struct so a whole service
//! (or several simulated pods) can share a single `Arc<MemoryStore>` without
//! external infrastructure.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::traits::{Checkpoint, CheckpointStore, OutboxEntry, OutboxStore, SequenceAllocator};

/// In-memory implementation of [`OutboxStore`], [`SequenceAllocator`], and
/// [`CheckpointStore`].
#[derive(Default)]
pub struct MemoryStore {
    /// Outbox entries keyed by sequence number.
    entries: RwLock<BTreeMap<i64, OutboxEntry>>,
    /// The sequence counter. Zero until the first allocation.
    counter: AtomicI64,
    /// Checkpoints keyed by client id.
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outbox entries currently held.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the outbox is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl OutboxStore for MemoryStore {
    async fn insert(&self, entry: &OutboxEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        let seq = entry.seq();
        if entries.contains_key(&seq) {
            return Err(StoreError::DuplicateSequence(seq));
        }
        entries.insert(seq, entry.clone());
        Ok(())
    }

    async fn read_after(&self, from_seq: i64, limit: usize) -> Result<Vec<OutboxEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range((from_seq + 1)..)
            .take(limit)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn latest(&self) -> Result<Option<OutboxEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.values().next_back().cloned())
    }

    async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.ttl >= now);
        Ok((before - entries.len()) as u64)
    }
}

#[async_trait]
impl SequenceAllocator for MemoryStore {
    async fn next(&self) -> Result<i64> {
        Ok(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn get(&self, client_id: &str) -> Result<Option<Checkpoint>> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(client_id).cloned())
    }

    async fn advance(&self, client_id: &str, seq: i64, event_id: Option<&str>) -> Result<()> {
        let mut checkpoints = self.checkpoints.write().await;
        match checkpoints.get_mut(client_id) {
            Some(existing) if existing.last_seq >= seq => {}
            Some(existing) => {
                existing.last_seq = seq;
                existing.last_event_id = event_id.map(str::to_string);
                existing.updated_at = Utc::now();
            }
            None => {
                checkpoints.insert(
                    client_id.to_string(),
                    Checkpoint {
                        client_id: client_id.to_string(),
                        last_seq: seq,
                        last_event_id: event_id.map(str::to_string),
                        updated_at: Utc::now(),
                    },
                );
            }
        }
        Ok(())
    }
}
