//! Knowledge-base endpoints: search, status and the retrieval quality check.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::rag::validator::{RagValidator, ValidationReport};
use crate::pipeline::rag::{RagDocument, RagStatus, RetrievalFilter, RetrievalSource};

const DEFAULT_TOP_K: usize = 5;
const MAX_TOP_K: usize = 20;

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub country: Option<String>,
    pub visa_type: Option<String>,
    pub top_k: Option<usize>,
}

impl SearchParams {
    /// Body fields win over query-string fields.
    fn merge(self, body: SearchParams) -> SearchParams {
        SearchParams {
            query: body.query.or(self.query),
            country: body.country.or(self.country),
            visa_type: body.visa_type.or(self.visa_type),
            top_k: body.top_k.or(self.top_k),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<RagDocument>,
    pub query: String,
    pub count: usize,
    pub source: RetrievalSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /api/chat/search?query=` or with a JSON body.
pub async fn search(
    State(ctx): State<ApiContext>,
    Query(params): Query<SearchParams>,
    body: Option<Json<SearchParams>>,
) -> Result<Json<SearchResponse>, ApiError> {
    let params = match body {
        Some(Json(body)) => params.merge(body),
        None => params,
    };
    let query = params
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("Search query is required".into()))?;
    let top_k = params.top_k.unwrap_or(DEFAULT_TOP_K).clamp(1, MAX_TOP_K);

    let context = ctx
        .run_blocking(move |core| {
            let filter = RetrievalFilter::new(params.country.as_deref(), params.visa_type.as_deref());
            core.rag().retrieve_context(&query, &filter, top_k)
        })
        .await?;

    Ok(Json(SearchResponse {
        count: context.count,
        results: context.documents,
        query: context.query,
        source: context.source,
        error: context.error,
    }))
}

/// `GET /api/rag/status`
pub async fn status(State(ctx): State<ApiContext>) -> Json<RagStatus> {
    Json(ctx.core.rag().status())
}

/// `POST /api/rag/validate` runs the retrieval test suite.
pub async fn validate(State(ctx): State<ApiContext>) -> Result<Json<ValidationReport>, ApiError> {
    let report = ctx
        .run_blocking(|core| RagValidator::new(core.rag()).validate())
        .await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_fields_override_query_string() {
        let query = SearchParams {
            query: Some("from query".into()),
            country: Some("USA".into()),
            ..Default::default()
        };
        let body = SearchParams {
            query: Some("from body".into()),
            top_k: Some(3),
            ..Default::default()
        };
        let merged = query.merge(body);
        assert_eq!(merged.query.as_deref(), Some("from body"));
        assert_eq!(merged.country.as_deref(), Some("USA"));
        assert_eq!(merged.top_k, Some(3));
    }
}
