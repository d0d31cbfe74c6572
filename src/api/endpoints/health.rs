//! Liveness and service status endpoints.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;
use crate::config::{APP_NAME, APP_VERSION};
use crate::pipeline::llm::MODELS;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// `GET /health`
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: APP_NAME,
        version: APP_VERSION,
    })
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub message: &'static str,
    pub service: &'static str,
    pub available_models: Vec<&'static str>,
    pub llm_configured: bool,
    pub provider: &'static str,
    pub model: String,
    pub rag_initialized: bool,
    pub uptime_secs: u64,
}

/// `GET /api/status`
pub async fn status(State(ctx): State<ApiContext>) -> Json<StatusResponse> {
    let core = &ctx.core;
    let ai = core.ai();
    Json(StatusResponse {
        message: "AI service is running",
        service: "AI Chat & RAG",
        available_models: MODELS.iter().map(|m| m.key).collect(),
        llm_configured: ai.is_configured(),
        provider: ai.provider(),
        model: ai.model().to_string(),
        rag_initialized: core.rag().is_initialized(),
        uptime_secs: core.uptime_secs(),
    })
}
