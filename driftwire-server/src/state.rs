//! Shared application state for the driftwire server.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use driftwire_store::{CheckpointStore, MemoryStore, OutboxStore, SequenceAllocator};
use tokio_util::sync::CancellationToken;

use crate::config::FanoutConfig;
use crate::middleware::ApiKeyLayer;
use crate::publisher::Publisher;
use crate::registry::ClientRegistry;
use crate::replay::ReplayCoordinator;

/// Shared state accessible by all handlers and background tasks.
pub struct AppState {
    /// The durable event log shared across pods.
    pub outbox: Arc<dyn OutboxStore>,
    /// Global sequence allocator.
    pub sequences: Arc<dyn SequenceAllocator>,
    /// Per-client delivery checkpoints.
    pub checkpoints: Arc<dyn CheckpointStore>,
    /// Durable publish path.
    pub publisher: Arc<Publisher>,
    /// Process-local client streams.
    pub registry: Arc<ClientRegistry>,
    /// Replay of missed events at stream open.
    pub replay: Arc<ReplayCoordinator>,
    /// API-key check applied by the auth middleware.
    pub auth: ApiKeyLayer,
    /// Event plane tuning.
    pub fanout: FanoutConfig,
    /// When this process started.
    pub started_at: DateTime<Utc>,
    shutdown: CancellationToken,
}

impl AppState {
    /// Create state over the given stores.
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        sequences: Arc<dyn SequenceAllocator>,
        checkpoints: Arc<dyn CheckpointStore>,
        fanout: FanoutConfig,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let publisher = Arc::new(Publisher::new(sequences.clone(), outbox.clone(), &fanout));
        let registry = Arc::new(ClientRegistry::new(&fanout, shutdown.clone()));
        let replay = Arc::new(ReplayCoordinator::new(
            outbox.clone(),
            checkpoints.clone(),
            &fanout,
        ));

        Self {
            outbox,
            sequences,
            checkpoints,
            publisher,
            registry,
            replay,
            auth: ApiKeyLayer::disabled(),
            fanout,
            started_at: Utc::now(),
            shutdown,
        }
    }

    /// Create state over a single in-memory store (for tests and
    /// development).
    pub fn in_memory(fanout: FanoutConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(store.clone(), store.clone(), store, fanout)
    }

    /// Require an API key on mutating endpoints.
    #[must_use]
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.auth = ApiKeyLayer::new(key);
        self
    }

    /// Root cancellation for everything owned by this state: background
    /// tasks and client streams.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// How long the server has been running.
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
