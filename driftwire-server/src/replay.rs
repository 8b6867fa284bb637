//! Checkpoint replay at stream open.
//!
//! When a client reconnects with a checkpoint, the coordinator reads the
//! missed outbox slice and injects it into the client's channel ahead of the
//! live feed. Replay is best effort: read failures are logged and the stream
//! proceeds straight to live events.

use std::sync::Arc;

use driftwire_core::{EventFilter, EventRecord};
use driftwire_store::{CheckpointStore, OutboxStore};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::FanoutConfig;
use crate::registry::ProducerHandle;

/// Replays missed events into a freshly opened stream.
pub struct ReplayCoordinator {
    outbox: Arc<dyn OutboxStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    batch_size: usize,
    pacing: std::time::Duration,
}

impl ReplayCoordinator {
    /// Create a coordinator over the given stores.
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: &FanoutConfig,
    ) -> Self {
        Self {
            outbox,
            checkpoints,
            batch_size: config.replay_batch_size,
            pacing: config.replay_pacing,
        }
    }

    /// Run one replay pass for a stream. `explicit` is the checkpoint the
    /// client presented at connect; when absent, the persisted checkpoint
    /// for this client id applies. Replay is a single batch: a client
    /// further behind than the batch size catches the rest up on a later
    /// reconnect.
    pub async fn run(
        &self,
        handle: &ProducerHandle,
        explicit: Option<i64>,
        filter: Option<&EventFilter>,
    ) {
        let client_id = handle.client_id.as_str();

        let effective = match explicit {
            Some(seq) => Some(seq),
            None => match self.checkpoints.get(client_id).await {
                Ok(checkpoint) => checkpoint.map(|c| c.last_seq),
                Err(e) => {
                    warn!(client_id, error = %e, "checkpoint lookup failed, skipping replay");
                    None
                }
            },
        };
        let Some(from_seq) = effective else {
            return;
        };

        let entries = match self.outbox.read_after(from_seq, self.batch_size).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(client_id, from_seq, error = %e, "replay read failed, proceeding live");
                return;
            }
        };
        if entries.is_empty() {
            return;
        }
        debug!(client_id, from_seq, count = entries.len(), "replaying missed events");

        for entry in entries {
            if handle.cancel.is_cancelled() {
                return;
            }
            let record = entry.record;
            if !replayable(&record, client_id, filter) {
                continue;
            }
            if !record.id.is_empty() {
                let mut recent = handle.recent.lock().expect("recent ids lock poisoned");
                if !recent.insert(record.id.clone()) {
                    continue;
                }
            }
            if let Err(mpsc::error::SendError(_)) = handle.sender.send(record).await {
                return;
            }
            tokio::time::sleep(self.pacing).await;
        }
    }
}

/// Replay applies the same routing rules as live dispatch: targeted events
/// belong only to their addressee, broadcasts pass the client's filter.
fn replayable(record: &EventRecord, client_id: &str, filter: Option<&EventFilter>) -> bool {
    match &record.target {
        Some(target) => target == client_id,
        None => filter.is_none_or(|f| f.accepts(record.event_type)),
    }
}
