//! End-to-end SSE streaming tests.
//!
//! Each test opens a real `text/event-stream` response against a running
//! server and drives the event plane through the publisher, exercising the
//! full poll -> dispatch -> stream -> transport path.

mod common;

use std::time::Duration;

use common::SseClient;
use driftwire_core::{EventPayload, EventType, NotificationPayload, NotificationSeverity};
use driftwire_store::{OutboxStore, SequenceAllocator};

#[tokio::test]
async fn broadcast_reaches_a_connected_client_with_sequence() {
    let (state, addr) = common::create_test_server().await;
    let mut client = SseClient::connect(addr, "/api/sse/connect?clientId=c1").await;

    let payload = EventPayload::Notification(NotificationPayload::new(
        "hi",
        NotificationSeverity::Info,
    ));
    let entry = state
        .publisher
        .publish(EventType::Notification, payload.to_data(), None)
        .await
        .unwrap();

    let body = client
        .read_until("event: notification", Duration::from_secs(2))
        .await;
    assert!(body.contains(&format!("id: {}", entry.record.id)));

    client
        .read_until(
            &format!("\"_sequence\":{}", entry.record.seq),
            Duration::from_secs(2),
        )
        .await;
}

#[tokio::test]
async fn filtered_client_sees_only_matching_types() {
    let (state, addr) = common::create_test_server().await;
    let mut client = SseClient::connect(addr, "/api/sse/connect?clientId=c1&filter=alert").await;

    state
        .publisher
        .publish(
            EventType::Notification,
            r#"{"kind":"notification"}"#.to_string(),
            None,
        )
        .await
        .unwrap();
    state
        .publisher
        .publish(EventType::Alert, r#"{"kind":"alert"}"#.to_string(), None)
        .await
        .unwrap();

    let body = client.read_until("event: alert", Duration::from_secs(2)).await;
    assert!(!body.contains("event: notification"));
}

#[tokio::test]
async fn targeted_event_reaches_only_its_addressee() {
    let (state, addr) = common::create_test_server().await;
    let mut c1 = SseClient::connect(addr, "/api/sse/connect?clientId=c1").await;
    let mut c2 = SseClient::connect(addr, "/api/sse/connect?clientId=c2").await;

    state
        .publisher
        .publish(
            EventType::Message,
            r#"{"secret":1}"#.to_string(),
            Some("c1".to_string()),
        )
        .await
        .unwrap();

    c1.read_until("\"secret\":1", Duration::from_secs(2)).await;
    c2.assert_absent("\"secret\":1", Duration::from_millis(300)).await;
}

#[tokio::test]
async fn duplicate_event_ids_are_yielded_once() {
    let (state, addr) = common::create_test_server().await;
    let mut client = SseClient::connect(addr, "/api/sse/connect?clientId=c1").await;

    // Three publishes; the middle one reuses the first id by writing the
    // outbox directly, as a misbehaving producer would.
    let first = state
        .publisher
        .publish(EventType::Message, r#"{"n":1}"#.to_string(), None)
        .await
        .unwrap();

    let mut dup = first.clone();
    dup.record.seq = state.sequences.next().await.unwrap();
    dup.record.data = r#"{"n":2}"#.to_string();
    state.outbox.insert(&dup).await.unwrap();

    state
        .publisher
        .publish(EventType::Message, r#"{"n":3}"#.to_string(), None)
        .await
        .unwrap();

    let body = client.read_until("\"n\":3", Duration::from_secs(2)).await;
    assert_eq!(body.matches(&format!("id: {}", first.record.id)).count(), 1);
    assert!(!body.contains("\"n\":2"));
}

#[tokio::test]
async fn reconnect_with_checkpoint_replays_missed_events_in_order() {
    let (state, addr) = common::create_test_server().await;

    let mut seqs = Vec::new();
    for n in 1..=6 {
        let entry = state
            .publisher
            .publish(EventType::Message, format!("{{\"n\":{n}}}"), None)
            .await
            .unwrap();
        seqs.push(entry.record.seq);
    }

    // Client presents a checkpoint of the second event: only 3..=6 replay.
    let path = format!("/api/sse/connect?clientId=c1&checkpoint={}", seqs[1]);
    let mut client = SseClient::connect(addr, &path).await;

    let body = client.read_until("\"n\":6", Duration::from_secs(2)).await;
    assert!(!body.contains("\"n\":1"));
    assert!(!body.contains("\"n\":2"));

    let positions: Vec<usize> = (3..=6)
        .map(|n| body.find(&format!("\"n\":{n}")).expect("missing event"))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "out of order: {body}");

    // Live events continue after the replayed window.
    state
        .publisher
        .publish(EventType::Message, r#"{"n":7}"#.to_string(), None)
        .await
        .unwrap();
    client.read_until("\"n\":7", Duration::from_secs(2)).await;
}

#[tokio::test]
async fn live_publish_racing_an_open_replay_window_stays_ordered() {
    // Pacing stretches the replay window to ~150ms so the live publish
    // below lands while replay is still draining, not after.
    let fanout = common::fast_fanout().with_replay_pacing(Duration::from_millis(5));
    let state = std::sync::Arc::new(driftwire_server::AppState::in_memory(fanout));
    let addr = common::spawn_server_with_state(state.clone()).await;

    for n in 1..=30 {
        state
            .publisher
            .publish(EventType::Message, format!("{{\"n\":{n}}}"), None)
            .await
            .unwrap();
    }

    let mut client = SseClient::connect(addr, "/api/sse/connect?clientId=c1&checkpoint=0").await;

    // Published mid-replay; it must still be yielded last, after every
    // replayed entry.
    let live = state
        .publisher
        .publish(EventType::Message, r#"{"n":"live"}"#.to_string(), None)
        .await
        .unwrap();

    let body = client
        .read_until(
            &format!("\"_sequence\":{}", live.record.seq),
            Duration::from_secs(5),
        )
        .await;

    let observed = extract_sequences(&body);
    assert_eq!(observed.len(), 31, "missing events: {observed:?}");
    assert!(
        observed.windows(2).all(|w| w[0] < w[1]),
        "sequence order violated: {observed:?}"
    );
    assert_eq!(*observed.last().unwrap(), live.record.seq);
}

/// Pull every `_sequence` value out of the raw stream, in arrival order.
fn extract_sequences(body: &str) -> Vec<i64> {
    const MARKER: &str = "\"_sequence\":";
    body.match_indices(MARKER)
        .filter_map(|(idx, _)| {
            let digits: String = body[idx + MARKER.len()..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        })
        .collect()
}

#[tokio::test]
async fn last_event_id_header_resumes_the_stream() {
    let (state, addr) = common::create_test_server().await;

    let mut last_seq = 0;
    for n in 1..=4 {
        last_seq = state
            .publisher
            .publish(EventType::Message, format!("{{\"n\":{n}}}"), None)
            .await
            .unwrap()
            .record
            .seq;
    }

    let header = format!("Last-Event-ID: {}", last_seq - 2);
    let mut client =
        SseClient::connect_with_header(addr, "/api/sse/connect?clientId=c1", &header).await;

    let body = client.read_until("\"n\":4", Duration::from_secs(2)).await;
    assert!(!body.contains("\"n\":1"));
    assert!(!body.contains("\"n\":2"));
    assert!(body.contains("\"n\":3"));
}

#[tokio::test]
async fn heartbeats_flow_through_the_ordered_path() {
    let fanout = common::fast_fanout().with_heartbeat_interval(Duration::from_millis(50));
    let state = std::sync::Arc::new(driftwire_server::AppState::in_memory(fanout));
    let addr = common::spawn_server_with_state(state.clone()).await;

    let mut client = SseClient::connect(addr, "/api/sse/connect?clientId=c1").await;
    let body = client
        .read_until("event: heartbeat", Duration::from_secs(2))
        .await;
    // Heartbeats are sequenced like any other event.
    assert!(body.contains("\"_sequence\":"));
}

#[tokio::test]
async fn heartbeats_respect_client_filters() {
    let fanout = common::fast_fanout().with_heartbeat_interval(Duration::from_millis(50));
    let state = std::sync::Arc::new(driftwire_server::AppState::in_memory(fanout));
    let addr = common::spawn_server_with_state(state.clone()).await;

    let mut client =
        SseClient::connect(addr, "/api/sse/connect?clientId=c1&filter=alert").await;

    // Give the ticker time to publish several heartbeats.
    client.assert_absent("event: heartbeat", Duration::from_millis(300)).await;
    assert!(!state.outbox.read_after(0, 10).await.unwrap().is_empty());
}
