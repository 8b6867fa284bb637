//! Tuning knobs for the event plane.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the poller, dispatcher, stream engines, replay,
/// heartbeat, and retention tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Sleep between empty outbox polls.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Maximum entries fetched per poll.
    #[serde(default = "default_poll_batch_size")]
    pub poll_batch_size: usize,

    /// How far behind the latest sequence a starting poller rewinds.
    #[serde(default = "default_poller_rewind")]
    pub poller_rewind: i64,

    /// Sleep after an outbox read error before retrying.
    #[serde(default = "default_poll_error_backoff", with = "humantime_serde")]
    pub poll_error_backoff: Duration,

    /// Capacity of each client's pending-event channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// How long an enqueue may wait on a full channel before the event is
    /// dropped for that client.
    #[serde(default = "default_enqueue_timeout", with = "humantime_serde")]
    pub enqueue_timeout: Duration,

    /// Capacity of each client's recently-seen event id set.
    #[serde(default = "default_recent_ids_capacity")]
    pub recent_ids_capacity: usize,

    /// Maximum entries replayed in one batch at stream open.
    #[serde(default = "default_replay_batch_size")]
    pub replay_batch_size: usize,

    /// Delay between replayed enqueues, pacing the client's decoder.
    #[serde(default = "default_replay_pacing", with = "humantime_serde")]
    pub replay_pacing: Duration,

    /// Interval between heartbeat publishes.
    #[serde(default = "default_heartbeat_interval", with = "humantime_serde")]
    pub heartbeat_interval: Duration,

    /// Retention of outbox entries.
    #[serde(default = "default_event_ttl", with = "humantime_serde")]
    pub event_ttl: Duration,

    /// Retry budget for a publish after the first attempt.
    #[serde(default = "default_publish_retries")]
    pub publish_retries: u32,

    /// Initial publish retry backoff; doubles per retry.
    #[serde(default = "default_publish_backoff", with = "humantime_serde")]
    pub publish_backoff: Duration,

    /// Interval between TTL reap sweeps.
    #[serde(default = "default_reap_interval", with = "humantime_serde")]
    pub reap_interval: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(50)
}

fn default_poll_batch_size() -> usize {
    100
}

fn default_poller_rewind() -> i64 {
    100
}

fn default_poll_error_backoff() -> Duration {
    Duration::from_secs(5)
}

fn default_channel_capacity() -> usize {
    10_000
}

fn default_enqueue_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_recent_ids_capacity() -> usize {
    1_000
}

fn default_replay_batch_size() -> usize {
    1_000
}

fn default_replay_pacing() -> Duration {
    Duration::from_millis(10)
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_event_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_publish_retries() -> u32 {
    3
}

fn default_publish_backoff() -> Duration {
    Duration::from_millis(100)
}

fn default_reap_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            poll_batch_size: default_poll_batch_size(),
            poller_rewind: default_poller_rewind(),
            poll_error_backoff: default_poll_error_backoff(),
            channel_capacity: default_channel_capacity(),
            enqueue_timeout: default_enqueue_timeout(),
            recent_ids_capacity: default_recent_ids_capacity(),
            replay_batch_size: default_replay_batch_size(),
            replay_pacing: default_replay_pacing(),
            heartbeat_interval: default_heartbeat_interval(),
            event_ttl: default_event_ttl(),
            publish_retries: default_publish_retries(),
            publish_backoff: default_publish_backoff(),
            reap_interval: default_reap_interval(),
        }
    }
}

impl FanoutConfig {
    /// Set the empty-poll sleep interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the per-client channel capacity.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the full-channel enqueue timeout.
    #[must_use]
    pub fn with_enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout = timeout;
        self
    }

    /// Set the recent event id set capacity.
    #[must_use]
    pub fn with_recent_ids_capacity(mut self, capacity: usize) -> Self {
        self.recent_ids_capacity = capacity;
        self
    }

    /// Set the inter-event replay pacing delay.
    #[must_use]
    pub fn with_replay_pacing(mut self, pacing: Duration) -> Self {
        self.replay_pacing = pacing;
        self
    }

    /// Set the heartbeat publish interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the initial publish retry backoff.
    #[must_use]
    pub fn with_publish_backoff(mut self, backoff: Duration) -> Self {
        self.publish_backoff = backoff;
        self
    }
}
