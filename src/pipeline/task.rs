//! Structured-generation task skeleton.
//!
//! Checklist, probability and document validation all run the same
//! pipeline: optional knowledge-base retrieval, a model call that must
//! return a JSON object, repair, and a hard-coded fallback when the model
//! cannot deliver after the retry policy is exhausted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pipeline::context::{AiUserContext, ContextError, ContextSource};
use crate::pipeline::json_repair::{extract_json_object, JsonRepairError};
use crate::pipeline::llm::types::FINISH_RATE_LIMITED;
use crate::pipeline::llm::{AiResponse, AiService, GenerateRequest};
use crate::pipeline::rag::{RagService, RetrievalFilter, RetrievedContext};
use crate::pipeline::retry::RetryPolicy;

pub const NO_POLICY_DOCUMENTS: &str = "No specific visa policy documents found in knowledge base.";

/// Maximum retrieved documents quoted in a task prompt.
const MAX_PROMPT_SOURCES: usize = 10;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Failed to fetch AI user context: {0}")]
    Context(#[from] ContextError),

    #[error("LLM not configured")]
    Unconfigured,

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("AI error: {0}")]
    Generation(String),

    #[error("JSON parse error: {0}")]
    Repair(#[from] JsonRepairError),

    #[error("Invalid response: {0}")]
    Invalid(String),
}

impl TaskError {
    /// Configuration and quota failures do not improve on retry.
    fn is_retryable(&self) -> bool {
        !matches!(
            self,
            TaskError::Context(_) | TaskError::Unconfigured | TaskError::RateLimited(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Result provenance
// ---------------------------------------------------------------------------

/// Whether a task result came from the model or the hard-coded fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Ai,
    Fallback,
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// Collaborators shared by every task.
#[derive(Clone, Copy)]
pub struct TaskDeps<'a> {
    pub ai: &'a AiService,
    pub rag: &'a RagService,
    pub contexts: &'a dyn ContextSource,
    pub retry: RetryPolicy,
}

impl<'a> TaskDeps<'a> {
    pub fn new(ai: &'a AiService, rag: &'a RagService, contexts: &'a dyn ContextSource) -> Self {
        Self {
            ai,
            rag,
            contexts,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The supplied context, or the backend's.
    pub fn load_context(
        &self,
        application_id: &str,
        auth_token: Option<&str>,
        mock_context: Option<&AiUserContext>,
    ) -> Result<AiUserContext, TaskError> {
        if let Some(context) = mock_context {
            tracing::info!(application_id, "Using supplied AI user context");
            return Ok(context.clone());
        }
        Ok(self.contexts.fetch(application_id, auth_token)?)
    }

    /// Knowledge-base retrieval, skipped while the index is not ready.
    pub fn retrieve(&self, query: &str, filter: &RetrievalFilter, top_k: usize) -> Option<RetrievedContext> {
        if !self.rag.is_initialized() {
            tracing::warn!("RAG service not initialized, proceeding without RAG context");
            return None;
        }
        let context = self.rag.retrieve_context(query, filter, top_k);
        if let Some(err) = &context.error {
            tracing::warn!(error = %err, "RAG retrieval error, continuing without RAG context");
            return None;
        }
        tracing::info!(query, documents = context.count, "Retrieved RAG documents");
        Some(context)
    }

    /// Run `request` until the model returns JSON that `parse` accepts.
    pub fn generate_json<T, F>(
        &self,
        request: &GenerateRequest<'_>,
        parse: F,
    ) -> Result<(T, AiResponse), TaskError>
    where
        F: Fn(Map<String, Value>) -> Result<T, TaskError>,
    {
        if !self.ai.is_configured() {
            return Err(TaskError::Unconfigured);
        }

        self.retry.run_if(
            |_attempt| {
                let response = self.ai.generate(request);
                if response.finish_reason == FINISH_RATE_LIMITED {
                    return Err(TaskError::RateLimited(response.error.unwrap_or_default()));
                }
                if let Some(err) = response.error.as_deref() {
                    return Err(TaskError::Generation(err.to_string()));
                }
                if !response.is_generated() {
                    return Err(TaskError::Generation("model returned a fallback reply".into()));
                }
                let object = extract_json_object(&response.content)?;
                let parsed = parse(object)?;
                Ok((parsed, response))
            },
            TaskError::is_retryable,
        )
    }
}

/// Retrieved documents as prompt text, or the "nothing found" line.
pub fn policy_extracts(rag: Option<&RetrievedContext>) -> String {
    match rag {
        Some(ctx) if !ctx.documents.is_empty() => ctx
            .documents
            .iter()
            .take(MAX_PROMPT_SOURCES)
            .map(|doc| format!("**Source: {}**\n{}", doc.source, doc.content))
            .collect::<Vec<_>>()
            .join("\n\n"),
        _ => NO_POLICY_DOCUMENTS.to_string(),
    }
}

/// Display text for a loosely typed list item.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => ["description", "factor", "text", "name"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}
