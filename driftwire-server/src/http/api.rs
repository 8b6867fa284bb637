//! Health and introspection handlers.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Response for `GET /api/health`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: i64,
    pub connected_clients: usize,
}

/// Response for `GET /api/sse/stats`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub connected_clients: usize,
    pub client_ids: Vec<String>,
    pub latest_seq: Option<i64>,
}

/// GET /api/health - liveness and basic counters.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.uptime_seconds(),
        connected_clients: state.registry.client_count(),
    })
}

/// GET /api/sse/stats - connected clients and outbox position.
pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.outbox.latest().await {
        Ok(latest) => {
            let mut client_ids = state.registry.client_ids();
            client_ids.sort();
            Json(StatsResponse {
                connected_clients: client_ids.len(),
                client_ids,
                latest_seq: latest.map(|e| e.seq()),
            })
            .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(super::ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}
