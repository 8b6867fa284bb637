//! Shared test utilities for driftwire-server integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use driftwire_server::{AppState, DriftwireServer, FanoutConfig, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Event plane config tightened for test speed.
pub fn fast_fanout() -> FanoutConfig {
    FanoutConfig::default()
        .with_poll_interval(Duration::from_millis(5))
        .with_replay_pacing(Duration::from_millis(1))
        .with_publish_backoff(Duration::from_millis(1))
}

/// Creates a test server over an in-memory store, returns state and address.
pub async fn create_test_server() -> (Arc<AppState>, SocketAddr) {
    let state = Arc::new(AppState::in_memory(fast_fanout()));
    let addr = spawn_server_with_state(state.clone()).await;
    (state, addr)
}

/// Spawns a server over the given state on an ephemeral port.
pub async fn spawn_server_with_state(state: Arc<AppState>) -> SocketAddr {
    let server = DriftwireServer::with_state(ServerConfig::new("127.0.0.1", 0), state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = server.run_with_listener(listener).await;
    });

    // Brief delay to ensure server is accepting connections
    tokio::time::sleep(Duration::from_millis(10)).await;

    addr
}

/// Minimal SSE client over a raw TCP stream.
///
/// Reads the chunked response as-is; assertions match within single frames,
/// which axum writes as whole chunks, so chunk framing never splits a
/// pattern under test.
pub struct SseClient {
    stream: TcpStream,
    buffer: String,
}

impl SseClient {
    /// Open an SSE stream against `path` and wait for response headers.
    pub async fn connect(addr: SocketAddr, path: &str) -> Self {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {path} HTTP/1.1\r\nHost: localhost\r\nAccept: text/event-stream\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut client = Self {
            stream,
            buffer: String::new(),
        };
        client.read_until("200 OK", Duration::from_secs(2)).await;
        client.read_until("\r\n\r\n", Duration::from_secs(2)).await;
        client
    }

    /// Open an SSE stream with an extra request header.
    pub async fn connect_with_header(addr: SocketAddr, path: &str, header: &str) -> Self {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {path} HTTP/1.1\r\nHost: localhost\r\nAccept: text/event-stream\r\n{header}\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut client = Self {
            stream,
            buffer: String::new(),
        };
        client.read_until("200 OK", Duration::from_secs(2)).await;
        client
    }

    /// Read until the accumulated body contains `pattern`; panics on
    /// timeout. Returns the full buffer so far.
    pub async fn read_until(&mut self, pattern: &str, timeout: Duration) -> String {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut chunk = [0u8; 4096];

        loop {
            if self.buffer.contains(pattern) {
                return self.buffer.clone();
            }
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .unwrap_or_else(|| {
                    panic!("timed out waiting for {pattern:?}; got: {}", self.buffer)
                });

            match tokio::time::timeout(remaining, self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) => panic!("stream closed while waiting for {pattern:?}"),
                Ok(Ok(n)) => self
                    .buffer
                    .push_str(&String::from_utf8_lossy(&chunk[..n])),
                Ok(Err(e)) => panic!("read error while waiting for {pattern:?}: {e}"),
                Err(_) => {
                    panic!("timed out waiting for {pattern:?}; got: {}", self.buffer)
                }
            }
        }
    }

    /// Keep reading for `window`, then assert the buffer never contained
    /// `pattern`.
    pub async fn assert_absent(&mut self, pattern: &str, window: Duration) {
        let deadline = tokio::time::Instant::now() + window;
        let mut chunk = [0u8; 4096];

        loop {
            let remaining = deadline.checked_duration_since(tokio::time::Instant::now());
            let Some(remaining) = remaining else { break };

            match tokio::time::timeout(remaining, self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => self
                    .buffer
                    .push_str(&String::from_utf8_lossy(&chunk[..n])),
                _ => break,
            }
        }

        assert!(
            !self.buffer.contains(pattern),
            "expected {pattern:?} to be absent; got: {}",
            self.buffer
        );
    }

    /// Everything received so far.
    pub fn received(&self) -> &str {
        &self.buffer
    }
}
