//! Heartbeat ticker.
//!
//! Heartbeats go through the publisher like any other event so they get a
//! sequence number, share the ordering guarantees, are visible to other
//! pods, and respect per-client filters. Ticks with no local clients
//! publish nothing.

use std::sync::Arc;

use driftwire_core::{EventPayload, EventType, HeartbeatPayload};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::config::FanoutConfig;
use crate::publisher::Publisher;
use crate::registry::ClientRegistry;

/// Periodically publishes heartbeat events while clients are connected.
pub struct HeartbeatTicker {
    publisher: Arc<Publisher>,
    registry: Arc<ClientRegistry>,
    interval: std::time::Duration,
    shutdown: CancellationToken,
}

impl HeartbeatTicker {
    /// Create a ticker bound to the given publisher and registry.
    pub fn new(
        publisher: Arc<Publisher>,
        registry: Arc<ClientRegistry>,
        config: &FanoutConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            publisher,
            registry,
            interval: config.heartbeat_interval,
            shutdown,
        }
    }

    /// Start ticking. Runs until the shutdown token fires.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick of a tokio interval completes immediately.
            ticker.tick().await;

            info!("heartbeat ticker started");
            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if self.registry.client_count() == 0 {
                            trace!("no local clients, skipping heartbeat");
                            continue;
                        }
                        let data = EventPayload::Heartbeat(HeartbeatPayload::new()).to_data();
                        if let Err(e) = self
                            .publisher
                            .publish(EventType::Heartbeat, data, None)
                            .await
                        {
                            warn!(error = %e, "heartbeat publish failed");
                        }
                    }
                }
            }
            info!("heartbeat ticker stopped");
        })
    }
}
