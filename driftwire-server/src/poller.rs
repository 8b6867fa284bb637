//! Per-process outbox poller.
//!
//! One poller runs per process. It reads new outbox entries in sequence
//! order and hands each to the [`Dispatch`] implementation; progress is
//! purely local, so every pod advances independently over the shared log.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use driftwire_core::EventRecord;
use driftwire_store::OutboxStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::FanoutConfig;

/// Where the poller hands polled events. Implemented by the client
/// registry; the poller holds only this interface, never the registry
/// itself.
pub trait Dispatch: Send + Sync {
    /// Route one event to matching local streams. Must not block.
    fn deliver(&self, record: EventRecord);
}

/// Background worker that drives local delivery off the shared outbox.
pub struct OutboxPoller {
    outbox: Arc<dyn OutboxStore>,
    dispatch: Arc<dyn Dispatch>,
    poll_interval: Duration,
    batch_size: usize,
    rewind: i64,
    error_backoff: Duration,
    last_delivered: Arc<AtomicI64>,
    shutdown: CancellationToken,
}

impl OutboxPoller {
    /// Create a poller over the given outbox and dispatcher.
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        dispatch: Arc<dyn Dispatch>,
        config: &FanoutConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            outbox,
            dispatch,
            poll_interval: config.poll_interval,
            batch_size: config.poll_batch_size,
            rewind: config.poller_rewind,
            error_backoff: config.poll_error_backoff,
            last_delivered: Arc::new(AtomicI64::new(0)),
            shutdown,
        }
    }

    /// Handle on the poller's local progress, readable after `spawn`.
    #[must_use]
    pub fn progress(&self) -> Arc<AtomicI64> {
        self.last_delivered.clone()
    }

    /// Start the poll loop. Runs until the shutdown token fires.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("outbox poller started");
            self.initialize().await;

            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    result = self.outbox.read_after(
                        self.last_delivered.load(Ordering::Acquire),
                        self.batch_size,
                    ) => {
                        match result {
                            Ok(entries) if entries.is_empty() => {
                                if !self.sleep(self.poll_interval).await {
                                    break;
                                }
                            }
                            Ok(entries) => {
                                debug!(count = entries.len(), "dispatching outbox batch");
                                for entry in entries {
                                    let seq = entry.seq();
                                    self.dispatch.deliver(entry.record);
                                    self.last_delivered.store(seq, Ordering::Release);
                                }
                            }
                            Err(e) => {
                                error!(error = %e, "outbox read failed");
                                if !self.sleep(self.error_backoff).await {
                                    break;
                                }
                            }
                        }
                    }
                }
            }

            info!("outbox poller stopped");
        })
    }

    /// Start a little behind the latest entry so a restarting pod re-drives
    /// the recent window to its (empty) client set; per-client dedup absorbs
    /// the overlap for clients that reconnected elsewhere.
    async fn initialize(&self) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                result = self.outbox.latest() => {
                    match result {
                        Ok(latest) => {
                            let start = latest
                                .map(|e| (e.seq() - self.rewind).max(0))
                                .unwrap_or(0);
                            self.last_delivered.store(start, Ordering::Release);
                            debug!(start, "outbox poller initialized");
                            return;
                        }
                        Err(e) => {
                            error!(error = %e, "failed to read latest outbox entry");
                            if !self.sleep(self.error_backoff).await {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Sleep unless shutdown fires first. Returns `false` on shutdown.
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
