//! driftwire-server - HTTP server and event plane for driftwire
//!
//! This crate wires the distributed event plane together: the publisher
//! writes durably to the shared outbox, one poller per process pulls new
//! entries in sequence order, and the dispatcher fans each entry out to the
//! locally connected SSE streams. No publisher ever touches a client stream
//! directly, which is what makes the service horizontally scalable without
//! sticky sessions.
//!
//! ```text
//! POST /api/sse/*          ┌───────────┐
//! ────────────────────────▶│ Publisher │──▶ outbox (shared, ordered)
//!                          └───────────┘        │
//!                                               │ read_after(seq)
//!                                        ┌──────▼──────┐
//!                                        │OutboxPoller │  one per pod
//!                                        └──────┬──────┘
//!                                               ▼
//!                                        ┌─────────────┐
//! GET /api/sse/connect ──register──────▶ │  Registry   │──▶ per-client
//!                                        └─────────────┘    channels ─▶ SSE
//! ```

pub mod config;
mod error;
pub mod heartbeat;
pub mod http;
pub mod middleware;
pub mod poller;
pub mod publisher;
pub mod reaper;
pub mod registry;
pub mod replay;
mod state;
pub mod stream;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use config::FanoutConfig;
pub use error::ServerError;
pub use http::create_router;
pub use publisher::{PublishError, Publisher};
pub use state::AppState;

/// The main driftwire server.
pub struct DriftwireServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl DriftwireServer {
    /// Create a new server with in-memory state.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: Arc::new(AppState::in_memory(FanoutConfig::default())),
        }
    }

    /// Create a server with custom state (durable stores, test fixtures).
    pub fn with_state(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shared application state.
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Token that stops the server, its background tasks, and every open
    /// stream when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown_token()
    }

    /// Run the server, binding to the configured address.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;

        tracing::info!("driftwire server listening on {}", addr);
        self.run_with_listener(listener).await
    }

    /// Run the server on an already-bound listener (used by tests to bind
    /// port 0).
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        let shutdown = self.state.shutdown_token();
        self.start_background_tasks();

        let router = create_router(self.state);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        Ok(())
    }

    /// Start the poller, heartbeat ticker, and TTL reaper. Each owns a
    /// child of the root shutdown token and exits when it fires.
    fn start_background_tasks(&self) {
        let state = &self.state;
        let shutdown = state.shutdown_token();

        let poller = poller::OutboxPoller::new(
            state.outbox.clone(),
            state.registry.clone(),
            &state.fanout,
            shutdown.child_token(),
        );
        let heartbeat = heartbeat::HeartbeatTicker::new(
            state.publisher.clone(),
            state.registry.clone(),
            &state.fanout,
            shutdown.child_token(),
        );
        let reaper = reaper::TtlReaper::new(
            state.outbox.clone(),
            &state.fanout,
            shutdown.child_token(),
        );

        poller.spawn();
        heartbeat.spawn();
        reaper.spawn();
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7410,
        }
    }
}

impl ServerConfig {
    /// Create a new ServerConfig with the specified host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the socket address string (e.g., "0.0.0.0:7410").
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
