//! API-key authentication middleware.
//!
//! Thin by design: the core's callers authenticate with a static key in the
//! `x-api-key` header. When no key is configured the middleware passes
//! everything through.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-api-key";

/// Authentication layer state.
#[derive(Clone)]
pub struct ApiKeyLayer {
    key: Option<Arc<str>>,
}

impl ApiKeyLayer {
    /// Create a layer requiring `key` when present.
    pub fn new(key: Option<String>) -> Self {
        Self {
            key: key.filter(|k| !k.is_empty()).map(Arc::from),
        }
    }

    /// Create a disabled layer (no key required).
    pub fn disabled() -> Self {
        Self { key: None }
    }

    fn allows(&self, provided: Option<&str>) -> bool {
        match &self.key {
            None => true,
            Some(expected) => provided == Some(expected.as_ref()),
        }
    }
}

/// Paths reachable without a key.
fn is_public(path: &str) -> bool {
    path == "/api/health"
}

/// Authentication middleware function.
pub async fn api_key_middleware(
    axum::Extension(layer): axum::Extension<ApiKeyLayer>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if request.method() == Method::OPTIONS || is_public(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if !layer.allows(provided) {
        tracing::debug!(path = %request.uri().path(), "rejected request without valid api key");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}
