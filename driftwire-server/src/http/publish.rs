//! Publish API handlers.
//!
//! Every endpoint here is synchronous up to durability: a 202 means the
//! event is in the outbox and will be delivered; a 5xx means it is not and
//! never will be.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use driftwire_core::{
    AlertPayload, AlertSeverity, DataUpdatePayload, EventPayload, EventType, NotificationPayload,
    NotificationSeverity,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::AppState;

/// Request body for `POST /api/sse/broadcast` and `/api/sse/send/:client_id`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    /// Event type wire name; defaults to `message`.
    #[serde(default)]
    pub event_type: Option<String>,
    /// Arbitrary JSON payload.
    pub data: serde_json::Value,
}

/// Request body for notification endpoints.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub message: String,
    #[serde(default = "default_notification_severity")]
    pub severity: NotificationSeverity,
}

fn default_notification_severity() -> NotificationSeverity {
    NotificationSeverity::Info
}

/// Request body for alert endpoints.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRequest {
    pub message: String,
    pub severity: AlertSeverity,
    pub category: String,
}

/// Request body for data-update endpoints.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataUpdateRequest {
    pub entity_id: String,
    pub entity_type: String,
    pub changes: serde_json::Value,
}

/// Success response for all publish endpoints.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub event_id: String,
    pub seq: i64,
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// POST /api/sse/broadcast - publish a custom event to all matching clients.
pub async fn broadcast(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BroadcastRequest>,
) -> Response {
    custom_publish(&state, request, None).await
}

/// POST /api/sse/send/:client_id - publish a custom event to one client.
pub async fn send_to_client(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    Json(request): Json<BroadcastRequest>,
) -> Response {
    custom_publish(&state, request, Some(client_id)).await
}

/// POST /api/sse/notification - publish a typed notification.
pub async fn notification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NotificationRequest>,
) -> Response {
    let payload =
        EventPayload::Notification(NotificationPayload::new(request.message, request.severity));
    publish(&state, EventType::Notification, payload.to_data(), None).await
}

/// POST /api/sse/notification/:client_id - targeted notification.
pub async fn notification_to_client(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    Json(request): Json<NotificationRequest>,
) -> Response {
    let payload =
        EventPayload::Notification(NotificationPayload::new(request.message, request.severity));
    publish(
        &state,
        EventType::Notification,
        payload.to_data(),
        Some(client_id),
    )
    .await
}

/// POST /api/sse/alert - publish a typed alert.
pub async fn alert(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AlertRequest>,
) -> Response {
    let payload = EventPayload::Alert(AlertPayload::new(
        request.message,
        request.severity,
        request.category,
    ));
    publish(&state, EventType::Alert, payload.to_data(), None).await
}

/// POST /api/sse/alert/:client_id - targeted alert.
pub async fn alert_to_client(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    Json(request): Json<AlertRequest>,
) -> Response {
    let payload = EventPayload::Alert(AlertPayload::new(
        request.message,
        request.severity,
        request.category,
    ));
    publish(&state, EventType::Alert, payload.to_data(), Some(client_id)).await
}

/// POST /api/sse/data-update - publish a typed entity change.
pub async fn data_update(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DataUpdateRequest>,
) -> Response {
    let payload = EventPayload::DataUpdate(DataUpdatePayload::new(
        request.entity_id,
        request.entity_type,
        request.changes,
    ));
    publish(&state, EventType::DataUpdate, payload.to_data(), None).await
}

/// POST /api/sse/data-update/:client_id - targeted entity change.
pub async fn data_update_to_client(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    Json(request): Json<DataUpdateRequest>,
) -> Response {
    let payload = EventPayload::DataUpdate(DataUpdatePayload::new(
        request.entity_id,
        request.entity_type,
        request.changes,
    ));
    publish(
        &state,
        EventType::DataUpdate,
        payload.to_data(),
        Some(client_id),
    )
    .await
}

async fn custom_publish(
    state: &AppState,
    request: BroadcastRequest,
    target: Option<String>,
) -> Response {
    let event_type = match request.event_type.as_deref() {
        None => EventType::Message,
        Some(raw) => match raw.parse::<EventType>() {
            Ok(event_type) => event_type,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: e.to_string(),
                    }),
                )
                    .into_response();
            }
        },
    };

    let data = request.data.to_string();
    publish(state, event_type, data, target).await
}

async fn publish(
    state: &AppState,
    event_type: EventType,
    data: String,
    target: Option<String>,
) -> Response {
    match state.publisher.publish(event_type, data, target).await {
        Ok(entry) => (
            StatusCode::ACCEPTED,
            Json(PublishResponse {
                event_id: entry.record.id,
                seq: entry.record.seq,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(event_type = %event_type, error = %e, "publish failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}
