//! Multi-pod fan-out tests.
//!
//! Two pods are simulated as two `AppState`s sharing one in-memory store,
//! each running its own poller over the shared outbox. Clients connect to
//! one pod; publishes go through the other; ordering and routing must hold
//! across the pair.

mod common;

use std::sync::Arc;
use std::time::Duration;

use driftwire_core::EventType;
use driftwire_server::AppState;
use driftwire_server::poller::OutboxPoller;
use driftwire_server::stream::StreamEngine;
use driftwire_store::{CheckpointStore, MemoryStore, OutboxStore};

/// Two states over one shared store, with a running poller each.
fn two_pods() -> (Arc<AppState>, Arc<AppState>) {
    let store = Arc::new(MemoryStore::new());
    let fanout = common::fast_fanout();

    let p1 = Arc::new(AppState::new(
        store.clone(),
        store.clone(),
        store.clone(),
        fanout.clone(),
    ));
    let p2 = Arc::new(AppState::new(store.clone(), store.clone(), store, fanout));

    for pod in [&p1, &p2] {
        OutboxPoller::new(
            pod.outbox.clone(),
            pod.registry.clone(),
            &pod.fanout,
            pod.shutdown_token().child_token(),
        )
        .spawn();
    }

    (p1, p2)
}

#[tokio::test]
async fn publish_on_one_pod_reaches_clients_of_another() {
    let (p1, p2) = two_pods();
    let mut registration = p1.registry.register("c1", None);

    let entry = p2
        .publisher
        .publish(EventType::Notification, r#"{"via":"p2"}"#.to_string(), None)
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), registration.receiver.recv())
        .await
        .expect("event did not cross pods")
        .unwrap();
    assert_eq!(received.seq, entry.record.seq);
    assert_eq!(received.id, entry.record.id);
}

#[tokio::test]
async fn targeted_event_is_delivered_on_the_owning_pod_only() {
    let (p1, p2) = two_pods();
    let mut c1 = p2.registry.register("c1", None);
    let mut c2 = p1.registry.register("c2", None);

    p1.publisher
        .publish(
            EventType::Message,
            r#"{"for":"c1"}"#.to_string(),
            Some("c1".to_string()),
        )
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), c1.receiver.recv())
        .await
        .expect("targeted event missing")
        .unwrap();
    assert_eq!(received.target.as_deref(), Some("c1"));

    assert!(
        tokio::time::timeout(Duration::from_millis(200), c2.receiver.recv())
            .await
            .is_err(),
        "c2 must not see c1's targeted event"
    );
}

#[tokio::test]
async fn pods_deliver_the_same_events_in_the_same_order() {
    let (p1, p2) = two_pods();
    let mut a = p1.registry.register("a", None);
    let mut b = p2.registry.register("b", None);

    for n in 1..=10 {
        p1.publisher
            .publish(EventType::Message, format!("{{\"n\":{n}}}"), None)
            .await
            .unwrap();
    }

    let mut order_a = Vec::new();
    let mut order_b = Vec::new();
    for _ in 0..10 {
        order_a.push(
            tokio::time::timeout(Duration::from_secs(2), a.receiver.recv())
                .await
                .unwrap()
                .unwrap()
                .seq,
        );
        order_b.push(
            tokio::time::timeout(Duration::from_secs(2), b.receiver.recv())
                .await
                .unwrap()
                .unwrap()
                .seq,
        );
    }

    assert!(order_a.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(order_a, order_b);
}

#[tokio::test]
async fn reconnecting_to_another_pod_resumes_without_duplicates() {
    let (p1, p2) = two_pods();

    // Session 1 on pod 1: consume three events, confirming each so the
    // persisted checkpoint tracks what reached the transport.
    let registration = p1.registry.register("c1", None);
    let mut engine = StreamEngine::new(registration, p1.checkpoints.clone());

    let mut first_session_ids = Vec::new();
    for n in 1..=3 {
        p1.publisher
            .publish(EventType::Message, format!("{{\"n\":{n}}}"), None)
            .await
            .unwrap();
    }
    for _ in 0..3 {
        let record = tokio::time::timeout(Duration::from_secs(2), engine.next_event())
            .await
            .unwrap()
            .unwrap();
        engine.confirm(&record).await;
        first_session_ids.push(record.id);
    }

    // Connection drops; events keep flowing while the client is away.
    p1.registry.unregister("c1");
    let mut away = Vec::new();
    for n in 4..=6 {
        let entry = p2
            .publisher
            .publish(EventType::Message, format!("{{\"n\":{n}}}"), None)
            .await
            .unwrap();
        away.push(entry.record.seq);
    }

    // Session 2 on pod 2, resuming from the persisted checkpoint.
    let checkpoint = p2.checkpoints.get("c1").await.unwrap().unwrap();
    assert_eq!(checkpoint.last_seq, 3);

    let registration = p2.registry.register_held("c1", None);
    let session = registration.session;
    let producer = registration.producer();
    let mut engine = StreamEngine::new(registration, p2.checkpoints.clone());
    p2.replay.run(&producer, None, None).await;
    p2.registry.release_live("c1", session);

    let mut resumed = Vec::new();
    for _ in 0..3 {
        let record = tokio::time::timeout(Duration::from_secs(2), engine.next_event())
            .await
            .unwrap()
            .unwrap();
        assert!(
            !first_session_ids.contains(&record.id),
            "event {} delivered twice across sessions",
            record.id
        );
        resumed.push(record.seq);
    }
    assert_eq!(resumed, away);
}

#[tokio::test]
async fn pod_restart_rewind_is_absorbed_by_client_dedup() {
    let store = Arc::new(MemoryStore::new());
    let fanout = common::fast_fanout();
    let pod = Arc::new(AppState::new(
        store.clone(),
        store.clone(),
        store.clone(),
        fanout.clone(),
    ));

    for n in 1..=5 {
        pod.publisher
            .publish(EventType::Message, format!("{{\"n\":{n}}}"), None)
            .await
            .unwrap();
    }

    // A "restarted" poller rewinds behind the latest seq and re-drives
    // the window; a client that already saw those ids keeps a quiet stream.
    let mut registration = pod.registry.register("c1", None);
    {
        let mut recent = registration.recent.lock().unwrap();
        for entry in store.read_after(0, 10).await.unwrap() {
            recent.insert(entry.record.id.clone());
        }
    }

    OutboxPoller::new(
        pod.outbox.clone(),
        pod.registry.clone(),
        &fanout,
        pod.shutdown_token().child_token(),
    )
    .spawn();

    assert!(
        tokio::time::timeout(Duration::from_millis(200), registration.receiver.recv())
            .await
            .is_err(),
        "rewound events must be suppressed by dedup"
    );

    // Genuinely new events still arrive.
    pod.publisher
        .publish(EventType::Message, r#"{"n":6}"#.to_string(), None)
        .await
        .unwrap();
    let received = tokio::time::timeout(Duration::from_secs(2), registration.receiver.recv())
        .await
        .expect("new event missing")
        .unwrap();
    assert_eq!(received.seq, 6);
}
