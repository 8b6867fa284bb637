//! Process-local client registry and event dispatcher.
//!
//! The registry owns one [`ClientHandle`] per connected stream: its bounded
//! pending-event channel, its filter, its recently-seen id set, its
//! cancellation token, and a delivery gate. [`ClientRegistry::deliver`]
//! routes one polled event to every matching handle without ever blocking
//! the caller: the fast path is a non-blocking `try_send`, and a full
//! channel moves the enqueue onto a detached task with a timeout so only
//! the slow client pays.
//!
//! The gate gives replay a happens-before over live dispatch: a stream
//! registered with [`ClientRegistry::register_held`] buffers live events
//! until [`ClientRegistry::release_live`] flushes them behind the replayed
//! batch, so the channel always carries replayed entries first.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use driftwire_core::{EventFilter, EventRecord};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::FanoutConfig;
use crate::poller::Dispatch;

/// Bounded set of recently processed event ids.
///
/// Insertion order is tracked so that on overflow the oldest half is
/// discarded in one sweep.
#[derive(Debug)]
pub struct RecentIds {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl RecentIds {
    /// Create a set bounded to `capacity` ids.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity: capacity.max(2),
        }
    }

    /// Record an id. Returns `false` if it was already present.
    pub fn insert(&mut self, id: String) -> bool {
        if self.seen.contains(&id) {
            return false;
        }
        self.seen.insert(id.clone());
        self.order.push_back(id);

        if self.order.len() > self.capacity {
            for _ in 0..self.capacity / 2 {
                if let Some(oldest) = self.order.pop_front() {
                    self.seen.remove(&oldest);
                }
            }
        }
        true
    }

    /// Number of ids currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Live-delivery state of one stream. While `Held`, events routed to the
/// client accumulate here instead of entering its channel, keeping the
/// channel free for the replay batch.
enum DeliveryGate {
    Held(Vec<EventRecord>),
    Open,
}

/// Per-client connection state held by the registry.
struct ClientHandle {
    session: u64,
    filter: Option<EventFilter>,
    sender: mpsc::Sender<EventRecord>,
    cancel: CancellationToken,
    recent: Arc<Mutex<RecentIds>>,
    gate: Arc<Mutex<DeliveryGate>>,
}

/// What a transport receives back from [`ClientRegistry::register`].
pub struct Registration {
    /// The (possibly generated) client id this stream is registered under.
    pub client_id: String,
    /// Distinguishes this registration from a later one under the same id.
    pub session: u64,
    /// Receive side of the pending-event channel; consumed by the stream
    /// engine.
    pub receiver: mpsc::Receiver<EventRecord>,
    /// Send side, for replay injection.
    pub sender: mpsc::Sender<EventRecord>,
    /// Fires on unregister or shutdown; the transport links its own abort
    /// to this token.
    pub cancel: CancellationToken,
    /// The client's dedup set, shared between live and replay enqueues.
    pub recent: Arc<Mutex<RecentIds>>,
}

impl Registration {
    /// Producer-side view of this registration, for tasks that inject
    /// events into the stream (replay).
    #[must_use]
    pub fn producer(&self) -> ProducerHandle {
        ProducerHandle {
            client_id: self.client_id.clone(),
            sender: self.sender.clone(),
            cancel: self.cancel.clone(),
            recent: self.recent.clone(),
        }
    }
}

/// Send-side handle on a registered stream.
pub struct ProducerHandle {
    /// Client id of the stream.
    pub client_id: String,
    /// Send side of the pending-event channel.
    pub sender: mpsc::Sender<EventRecord>,
    /// Connection cancellation.
    pub cancel: CancellationToken,
    /// The client's dedup set.
    pub recent: Arc<Mutex<RecentIds>>,
}

/// Process-local registry of live client streams.
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, ClientHandle>>,
    sessions: AtomicU64,
    channel_capacity: usize,
    enqueue_timeout: Duration,
    recent_capacity: usize,
    shutdown: CancellationToken,
}

impl ClientRegistry {
    /// Create a registry whose client cancellations are children of
    /// `shutdown`.
    pub fn new(config: &FanoutConfig, shutdown: CancellationToken) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            sessions: AtomicU64::new(0),
            channel_capacity: config.channel_capacity,
            enqueue_timeout: config.enqueue_timeout,
            recent_capacity: config.recent_ids_capacity,
            shutdown,
        }
    }

    /// Record a client and hand back its stream-side state. Live delivery
    /// starts immediately. A client reconnecting under an id that is still
    /// registered displaces the old registration, cancelling its stream.
    pub fn register(&self, client_id: &str, filter: Option<EventFilter>) -> Registration {
        self.register_inner(client_id, filter, DeliveryGate::Open)
    }

    /// Like [`register`](Self::register), but live events are buffered
    /// until [`release_live`](Self::release_live) flushes them, so a replay
    /// pass can enqueue historical entries first.
    pub fn register_held(&self, client_id: &str, filter: Option<EventFilter>) -> Registration {
        self.register_inner(client_id, filter, DeliveryGate::Held(Vec::new()))
    }

    fn register_inner(
        &self,
        client_id: &str,
        filter: Option<EventFilter>,
        gate: DeliveryGate,
    ) -> Registration {
        let session = self.sessions.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.channel_capacity);
        let cancel = self.shutdown.child_token();
        let recent = Arc::new(Mutex::new(RecentIds::new(self.recent_capacity)));

        let handle = ClientHandle {
            session,
            filter,
            sender: sender.clone(),
            cancel: cancel.clone(),
            recent: recent.clone(),
            gate: Arc::new(Mutex::new(gate)),
        };

        let displaced = {
            let mut clients = self.clients.write().expect("registry lock poisoned");
            clients.insert(client_id.to_string(), handle)
        };
        if let Some(old) = displaced {
            debug!(client_id, "displacing previous registration");
            old.cancel.cancel();
        }

        Registration {
            client_id: client_id.to_string(),
            session,
            receiver,
            sender,
            cancel,
            recent,
        }
    }

    /// Open a held registration's gate: flush the events buffered during
    /// replay into its channel, then deliver live directly. The flush runs
    /// under the gate lock, so nothing can slot between replayed and
    /// buffered events. No-op if the session was displaced or closed.
    pub fn release_live(&self, client_id: &str, session: u64) {
        let parts = {
            let clients = self.clients.read().expect("registry lock poisoned");
            clients
                .get(client_id)
                .filter(|h| h.session == session)
                .map(|h| (h.sender.clone(), h.recent.clone(), h.gate.clone()))
        };
        let Some((sender, recent, gate)) = parts else {
            return;
        };

        let mut gate = gate.lock().expect("delivery gate lock poisoned");
        if let DeliveryGate::Held(buffered) = std::mem::replace(&mut *gate, DeliveryGate::Open) {
            trace!(client_id, count = buffered.len(), "flushing events held during replay");
            for record in buffered {
                enqueue(sender.clone(), recent.clone(), record, self.enqueue_timeout);
            }
        }
    }

    /// Remove a client and fire its cancellation. No-op if absent.
    pub fn unregister(&self, client_id: &str) {
        let removed = {
            let mut clients = self.clients.write().expect("registry lock poisoned");
            clients.remove(client_id)
        };
        if let Some(handle) = removed {
            handle.cancel.cancel();
        }
    }

    /// Remove a specific registration, leaving a newer one under the same
    /// id untouched. Used by transport cleanup, which may run after the
    /// client already reconnected.
    pub fn unregister_session(&self, client_id: &str, session: u64) {
        let removed = {
            let mut clients = self.clients.write().expect("registry lock poisoned");
            match clients.get(client_id) {
                Some(handle) if handle.session == session => clients.remove(client_id),
                _ => None,
            }
        };
        if let Some(handle) = removed {
            handle.cancel.cancel();
        }
    }

    /// Number of locally connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.read().expect("registry lock poisoned").len()
    }

    /// Ids of locally connected clients.
    pub fn client_ids(&self) -> Vec<String> {
        let clients = self.clients.read().expect("registry lock poisoned");
        clients.keys().cloned().collect()
    }

    /// Route one event to every matching local stream. Never blocks.
    pub fn deliver(&self, record: EventRecord) {
        type Route = (
            mpsc::Sender<EventRecord>,
            Arc<Mutex<RecentIds>>,
            Arc<Mutex<DeliveryGate>>,
        );
        let matches: Vec<Route> = {
            let clients = self.clients.read().expect("registry lock poisoned");
            match &record.target {
                Some(target) => clients
                    .get(target)
                    .map(|h| (h.sender.clone(), h.recent.clone(), h.gate.clone()))
                    .into_iter()
                    .collect(),
                None => clients
                    .values()
                    .filter(|h| {
                        h.filter
                            .as_ref()
                            .is_none_or(|f| f.accepts(record.event_type))
                    })
                    .map(|h| (h.sender.clone(), h.recent.clone(), h.gate.clone()))
                    .collect(),
            }
        };

        for (sender, recent, gate) in matches {
            let mut gate = gate.lock().expect("delivery gate lock poisoned");
            match &mut *gate {
                // Dedup happens at flush time, not here: if the replay
                // batch also carries this id, the replayed copy must win so
                // the held copy is dropped rather than delivered late.
                DeliveryGate::Held(buffered) => buffered.push(record.clone()),
                DeliveryGate::Open => {
                    enqueue(sender, recent, record.clone(), self.enqueue_timeout);
                }
            }
        }
    }
}

impl Dispatch for ClientRegistry {
    fn deliver(&self, record: EventRecord) {
        ClientRegistry::deliver(self, record);
    }
}

/// Enqueue one event for one client: dedup by event id, then a non-blocking
/// send; a full channel falls back to a detached wait with a timeout.
fn enqueue(
    sender: mpsc::Sender<EventRecord>,
    recent: Arc<Mutex<RecentIds>>,
    record: EventRecord,
    timeout: Duration,
) {
    if !record.id.is_empty() {
        let mut recent = recent.lock().expect("recent ids lock poisoned");
        if !recent.insert(record.id.clone()) {
            trace!(seq = record.seq, "dropping duplicate event id");
            return;
        }
    }

    match sender.try_send(record) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Closed(_)) => {}
        Err(mpsc::error::TrySendError::Full(record)) => {
            // Slow client: park the enqueue on its own task so the
            // dispatcher keeps moving.
            tokio::spawn(async move {
                let seq = record.seq;
                match sender.send_timeout(record, timeout).await {
                    Ok(()) => {}
                    Err(mpsc::error::SendTimeoutError::Closed(_)) => {}
                    Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                        warn!(seq, "client channel full, dropping event");
                    }
                }
            });
        }
    }
}
