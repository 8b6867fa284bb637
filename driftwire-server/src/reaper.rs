//! TTL retention sweep for the outbox.

use std::sync::Arc;

use chrono::Utc;
use driftwire_store::OutboxStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::FanoutConfig;

/// Periodically deletes outbox entries whose TTL has passed.
pub struct TtlReaper {
    outbox: Arc<dyn OutboxStore>,
    interval: std::time::Duration,
    shutdown: CancellationToken,
}

impl TtlReaper {
    /// Create a reaper over the given outbox.
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        config: &FanoutConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            outbox,
            interval: config.reap_interval,
            shutdown,
        }
    }

    /// Start sweeping. Runs until the shutdown token fires.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            info!("ttl reaper started");
            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match self.outbox.reap_expired(Utc::now()).await {
                            Ok(0) => {}
                            Ok(reaped) => debug!(reaped, "reaped expired outbox entries"),
                            Err(e) => warn!(error = %e, "outbox reap failed"),
                        }
                    }
                }
            }
            info!("ttl reaper stopped");
        })
    }
}
