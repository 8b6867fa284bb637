//! Per-client stream engine.
//!
//! Owns the consuming side of one connection: awaiting the pending-event
//! channel under linked cancellation, and advancing the client's persisted
//! checkpoint once an event has been handed to the transport. Filtering and
//! deduplication happen on the enqueue side (registry and replay), so what
//! arrives here is already this client's stream in delivery order.

use std::sync::Arc;

use driftwire_core::EventRecord;
use driftwire_store::CheckpointStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::registry::Registration;

/// Drives one client's yield loop.
pub struct StreamEngine {
    client_id: String,
    receiver: mpsc::Receiver<EventRecord>,
    cancel: CancellationToken,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl StreamEngine {
    /// Build an engine from a registration. The registration's send side is
    /// not retained here; it lives in the registry (live events) and the
    /// replay task.
    pub fn new(registration: Registration, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            client_id: registration.client_id,
            receiver: registration.receiver,
            cancel: registration.cancel,
            checkpoints,
        }
    }

    /// Client id this engine yields to.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Await the next event. Returns `None` once the connection is
    /// cancelled or every producer is gone.
    pub async fn next_event(&mut self) -> Option<EventRecord> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            record = self.receiver.recv() => record,
        }
    }

    /// Record that an event reached the client's byte stream. Checkpoint
    /// failures are logged and swallowed; they must not end the stream.
    pub async fn confirm(&self, record: &EventRecord) {
        if let Err(e) = self
            .checkpoints
            .advance(&self.client_id, record.seq, Some(&record.id))
            .await
        {
            warn!(
                client_id = %self.client_id,
                seq = record.seq,
                error = %e,
                "checkpoint write failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FanoutConfig;
    use crate::registry::ClientRegistry;
    use driftwire_core::EventType;
    use driftwire_store::MemoryStore;

    fn record(seq: i64, id: &str) -> EventRecord {
        EventRecord {
            id: id.to_string(),
            event_type: EventType::Message,
            data: "{}".to_string(),
            seq,
            target: None,
        }
    }

    #[tokio::test]
    async fn yields_in_enqueue_order() {
        let registry = ClientRegistry::new(&FanoutConfig::default(), CancellationToken::new());
        let store = Arc::new(MemoryStore::new());
        let registration = registry.register("c1", None);
        let mut engine = StreamEngine::new(registration, store);

        registry.deliver(record(1, "a"));
        registry.deliver(record(2, "b"));

        assert_eq!(engine.next_event().await.unwrap().seq, 1);
        assert_eq!(engine.next_event().await.unwrap().seq, 2);
    }

    #[tokio::test]
    async fn confirm_advances_checkpoint() {
        let registry = ClientRegistry::new(&FanoutConfig::default(), CancellationToken::new());
        let store = Arc::new(MemoryStore::new());
        let registration = registry.register("c1", None);
        let engine = StreamEngine::new(registration, store.clone());

        engine.confirm(&record(9, "e-9")).await;

        let cp = driftwire_store::CheckpointStore::get(store.as_ref(), "c1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cp.last_seq, 9);
        assert_eq!(cp.last_event_id.as_deref(), Some("e-9"));
    }

    #[tokio::test]
    async fn cancellation_ends_the_stream() {
        let registry = ClientRegistry::new(&FanoutConfig::default(), CancellationToken::new());
        let store = Arc::new(MemoryStore::new());
        let registration = registry.register("c1", None);
        let mut engine = StreamEngine::new(registration, store);

        registry.unregister("c1");
        assert!(engine.next_event().await.is_none());
    }
}
