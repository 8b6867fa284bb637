//! HTTP server module.

mod api;
mod publish;
mod sse;

use std::sync::Arc;

use axum::{
    Extension, Router, middleware,
    routing::{get, post},
};

use crate::AppState;
use crate::middleware::api_key_middleware;

pub use api::{HealthResponse, StatsResponse};
pub use publish::{
    AlertRequest, BroadcastRequest, DataUpdateRequest, ErrorResponse, NotificationRequest,
    PublishResponse,
};
pub use sse::ConnectQuery;

/// Create the HTTP router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_layer = state.auth.clone();

    Router::new()
        .route("/api/health", get(api::health))
        .route("/api/sse/connect", get(sse::connect))
        .route("/api/sse/stats", get(api::stats))
        .route("/api/sse/broadcast", post(publish::broadcast))
        .route("/api/sse/send/:client_id", post(publish::send_to_client))
        .route("/api/sse/notification", post(publish::notification))
        .route(
            "/api/sse/notification/:client_id",
            post(publish::notification_to_client),
        )
        .route("/api/sse/alert", post(publish::alert))
        .route("/api/sse/alert/:client_id", post(publish::alert_to_client))
        .route("/api/sse/data-update", post(publish::data_update))
        .route(
            "/api/sse/data-update/:client_id",
            post(publish::data_update_to_client),
        )
        .layer(middleware::from_fn(api_key_middleware))
        .layer(Extension(auth_layer))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FanoutConfig;
    use axum_test::TestServer;

    #[tokio::test]
    async fn router_serves_health() {
        let state = Arc::new(AppState::in_memory(FanoutConfig::default()));
        let server = TestServer::new(create_router(state)).unwrap();

        let response = server.get("/api/health").await;
        response.assert_status_ok();
    }

    #[tokio::test]
    async fn api_key_guards_publish_but_not_health() {
        let state = Arc::new(
            AppState::in_memory(FanoutConfig::default())
                .with_api_key(Some("hunter2".to_string())),
        );
        let server = TestServer::new(create_router(state)).unwrap();

        server.get("/api/health").await.assert_status_ok();

        let denied = server
            .post("/api/sse/broadcast")
            .json(&serde_json::json!({"data": {"x": 1}}))
            .await;
        denied.assert_status(axum::http::StatusCode::UNAUTHORIZED);

        let allowed = server
            .post("/api/sse/broadcast")
            .add_header(
                axum::http::HeaderName::from_static("x-api-key"),
                axum::http::HeaderValue::from_static("hunter2"),
            )
            .json(&serde_json::json!({"data": {"x": 1}}))
            .await;
        allowed.assert_status(axum::http::StatusCode::ACCEPTED);
    }
}
