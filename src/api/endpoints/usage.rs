//! `GET /api/usage?user_id=`: token usage since process start.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::types::ApiContext;
use crate::pipeline::llm::usage::UsageStats;

#[derive(Deserialize)]
pub struct UsageParams {
    pub user_id: Option<String>,
}

pub async fn stats(State(ctx): State<ApiContext>, Query(params): Query<UsageParams>) -> Json<UsageStats> {
    Json(ctx.core.ai().usage_stats(params.user_id.as_deref()))
}
