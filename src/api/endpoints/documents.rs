//! Document endpoints.
//!
//! `POST /api/documents/upload` adds text to the knowledge base.
//! `POST /api/documents/validate` checks an applicant's uploaded document.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::validation::{self, ValidationRequest, ValidationResult};

#[derive(Deserialize)]
pub struct UploadRequest {
    pub file_content: String,
    #[serde(default = "default_document_type")]
    pub document_type: String,
}

fn default_document_type() -> String {
    "general".to_string()
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub message: String,
    pub document_type: String,
    pub chunks_indexed: usize,
}

/// `POST /api/documents/upload`
pub async fn upload(
    State(ctx): State<ApiContext>,
    Json(payload): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ApiError> {
    if payload.file_content.trim().is_empty() {
        return Err(ApiError::BadRequest("Document content cannot be empty".into()));
    }
    let document_type = payload.document_type.trim().to_string();
    if document_type.is_empty() {
        return Err(ApiError::BadRequest("Document type cannot be empty".into()));
    }

    let doc_type = document_type.clone();
    let chunks_indexed = ctx
        .run_blocking(move |core| core.rag().index_document(&payload.file_content, &doc_type))
        .await??;

    Ok(Json(UploadResponse {
        status: "success",
        message: format!("Document indexed into {chunks_indexed} chunks"),
        document_type,
        chunks_indexed,
    }))
}

/// `POST /api/documents/validate`
pub async fn validate(
    State(ctx): State<ApiContext>,
    Json(req): Json<ValidationRequest>,
) -> Result<Json<ValidationResult>, ApiError> {
    if req.document_type.trim().is_empty() {
        return Err(ApiError::BadRequest("Document type is required".into()));
    }
    let result = ctx
        .run_blocking(move |core| validation::validate(&core.task_deps(), &req))
        .await?;
    Ok(Json(result))
}
