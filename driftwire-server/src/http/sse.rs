//! SSE transport adapter.
//!
//! The core produces [`EventRecord`]s; this module formats them as
//! `text/event-stream` frames and owns the connection lifecycle: register,
//! replay, yield loop, unregister. No synthetic `connected` event is
//! emitted; liveness between events comes from keep-alive comment frames.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, header},
    response::IntoResponse,
    response::sse::{Event, KeepAlive, Sse},
};
use driftwire_core::{EventFilter, EventRecord};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::AppState;
use crate::registry::ClientRegistry;
use crate::stream::StreamEngine;

/// Interval between keep-alive comment frames.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Query parameters for `GET /api/sse/connect`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectQuery {
    /// Client id; generated when absent so every stream is addressable.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Event type filter.
    #[serde(default)]
    pub filter: Option<String>,
    /// Resume position: replay events with `seq` greater than this.
    #[serde(default)]
    pub checkpoint: Option<i64>,
    /// Alternative resume position carrying the last seen sequence.
    #[serde(default)]
    pub last_event_id: Option<String>,
}

/// GET /api/sse/connect - open an event stream.
pub async fn connect(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let client_id = query
        .client_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let filter = query.filter.as_deref().and_then(EventFilter::parse);
    let checkpoint = resolve_checkpoint(&query, &headers);

    info!(
        client_id = %client_id,
        filter = filter.as_ref().map(EventFilter::pattern),
        checkpoint,
        "sse client connected"
    );

    // Live delivery stays gated until the replay batch has fully drained
    // into the channel, so replayed entries always precede live ones; the
    // events held back meanwhile flush in behind them.
    let registration = state.registry.register_held(&client_id, filter.clone());
    let guard = ConnectionGuard {
        registry: state.registry.clone(),
        client_id: client_id.clone(),
        session: registration.session,
    };

    {
        let replay = state.replay.clone();
        let registry = state.registry.clone();
        let producer = registration.producer();
        let session = registration.session;
        let filter = filter.clone();
        tokio::spawn(async move {
            replay.run(&producer, checkpoint, filter.as_ref()).await;
            registry.release_live(&producer.client_id, session);
        });
    }

    let mut engine = StreamEngine::new(registration, state.checkpoints.clone());
    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(record) = engine.next_event().await {
            yield Ok::<_, Infallible>(sse_frame(&record));
            // Resumed once the transport accepted the previous frame.
            engine.confirm(&record).await;
        }
        info!(client_id = %engine.client_id(), "sse client disconnected");
    };

    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    );
    ([(header::CACHE_CONTROL, "no-cache")], sse)
}

/// Resolution order: explicit `checkpoint`, then a numeric `lastEventId`
/// query value, then a numeric `Last-Event-ID` header. The persisted
/// checkpoint is consulted later by the replay coordinator only when all
/// three are absent.
fn resolve_checkpoint(query: &ConnectQuery, headers: &HeaderMap) -> Option<i64> {
    if let Some(seq) = query.checkpoint {
        return Some(seq);
    }
    if let Some(raw) = query.last_event_id.as_deref()
        && let Ok(seq) = raw.trim().parse::<i64>()
    {
        return Some(seq);
    }
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
}

/// Format one event record as an SSE frame.
fn sse_frame(record: &EventRecord) -> Event {
    Event::default()
        .id(&record.id)
        .event(record.event_type.as_str())
        .data(inject_sequence(&record.data, record.seq))
}

/// Splice a `_sequence` field at the start of the payload's first JSON
/// object so clients can track their position without parsing SSE ids.
/// Non-object payloads pass through untouched.
fn inject_sequence(data: &str, seq: i64) -> String {
    let Some(brace) = data.find('{') else {
        return data.to_string();
    };
    if !data[..brace].trim().is_empty() {
        return data.to_string();
    }

    let rest = &data[brace + 1..];
    let mut out = String::with_capacity(data.len() + 20);
    out.push_str(&data[..=brace]);
    out.push_str("\"_sequence\":");
    out.push_str(&seq.to_string());
    if !rest.trim_start().starts_with('}') {
        out.push(',');
    }
    out.push_str(rest);
    out
}

/// Unregisters the stream's registration when the transport drops it,
/// whichever way the connection ended.
struct ConnectionGuard {
    registry: Arc<ClientRegistry>,
    client_id: String,
    session: u64,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.unregister_session(&self.client_id, self.session);
    }
}
