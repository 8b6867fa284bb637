//! HTTP middleware.

mod auth;

pub use auth::{ApiKeyLayer, api_key_middleware};
