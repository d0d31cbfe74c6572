//! Shared types for the API layer.

use std::sync::{Arc, Mutex};

use axum::http::HeaderMap;

use crate::api::error::ApiError;
use crate::core_state::CoreState;
use crate::pipeline::llm::rate::SlidingWindowLimiter;

/// Requests per client per minute before the API answers 429.
pub const REQUESTS_PER_MINUTE: u32 = 120;

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
/// Wraps `CoreState` plus the request throttle.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
    pub rate_limiter: Arc<Mutex<SlidingWindowLimiter>>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self::with_limit(core, REQUESTS_PER_MINUTE)
    }

    pub fn with_limit(core: Arc<CoreState>, requests_per_minute: u32) -> Self {
        Self {
            core,
            rate_limiter: Arc::new(Mutex::new(SlidingWindowLimiter::per_minute(requests_per_minute))),
        }
    }

    /// Run blocking pipeline work on the blocking thread pool.
    ///
    /// Model, retrieval and backend calls use blocking HTTP clients and
    /// must never run on an async worker thread.
    pub async fn run_blocking<T, F>(&self, work: F) -> Result<T, ApiError>
    where
        F: FnOnce(&CoreState) -> T + Send + 'static,
        T: Send + 'static,
    {
        let core = Arc::clone(&self.core);
        Ok(tokio::task::spawn_blocking(move || work(&core)).await?)
    }
}

/// Bearer token from the `Authorization` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert("Authorization", "Basic abc".parse().unwrap());
        assert!(bearer_token(&headers).is_none());

        headers.insert("Authorization", "Bearer tok-123".parse().unwrap());
        assert_eq!(bearer_token(&headers).as_deref(), Some("tok-123"));

        headers.insert("Authorization", "Bearer ".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
    }
}
