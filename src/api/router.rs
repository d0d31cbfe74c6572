//! HTTP router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! `/health` sits at the root; everything else is nested under `/api/`.
//!
//! Layers (outermost → innermost):
//! 1. CORS → 2. HTTP tracing → 3. Rate limiter → Handler

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the service router over shared state.
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

pub(crate) fn build_router(ctx: ApiContext) -> Router {
    let cors = cors_layer(&ctx.core.settings.cors_origins);

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let api = Router::new()
        .route("/status", get(endpoints::health::status))
        .route("/chat", post(endpoints::chat::send))
        .route("/chat/search", post(endpoints::rag::search))
        .route("/conversation/:id", get(endpoints::chat::conversation))
        .route("/checklist", post(endpoints::checklist::generate))
        .route("/probability", post(endpoints::probability::generate))
        .route("/documents/upload", post(endpoints::documents::upload))
        .route("/documents/validate", post(endpoints::documents::validate))
        .route("/rag/status", get(endpoints::rag::status))
        .route("/rag/validate", post(endpoints::rag::validate))
        .route("/usage", get(endpoints::usage::stats))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        // Extension must be outermost so the limiter can extract ApiContext
        .layer(axum::Extension(ctx));

    Router::new()
        .route("/health", get(endpoints::health::check))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Any origin when none are configured, otherwise the configured list.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(%origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}
