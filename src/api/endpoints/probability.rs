//! `POST /api/probability`: approval probability with risk explanation.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{bearer_token, ApiContext};
use crate::core_state::result_cache_key;
use crate::pipeline::probability::{self, ProbabilityRequest, ProbabilityResult};

#[derive(Deserialize)]
pub struct ProbabilityBody {
    #[serde(flatten)]
    pub request: ProbabilityRequest,
    #[serde(default)]
    pub refresh: bool,
}

pub async fn generate(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Json(body): Json<ProbabilityBody>,
) -> Result<Json<ProbabilityResult>, ApiError> {
    let ProbabilityBody { mut request, refresh } = body;
    if request.application_id.trim().is_empty() {
        return Err(ApiError::BadRequest("application_id is required".into()));
    }
    if request.auth_token.is_none() {
        request.auth_token = bearer_token(&headers);
    }

    // Supplied contexts bypass the backend, so their results are not shared.
    let cache_key = match request.mock_context {
        Some(_) => None,
        None => result_cache_key(&request.application_id, request.auth_token.as_deref()),
    };
    if let Some(key) = &cache_key {
        if refresh {
            ctx.core.invalidate(key);
        } else if let Some(cached) = ctx.core.cached_probability(key) {
            tracing::debug!(application_id = %request.application_id, "Probability served from cache");
            return Ok(Json(cached));
        }
    }

    let result = ctx
        .run_blocking(move |core| {
            let result = probability::generate(&core.task_deps(), &request);
            if let Some(key) = &cache_key {
                core.store_probability(key, &result);
            }
            result
        })
        .await?;
    Ok(Json(result))
}
