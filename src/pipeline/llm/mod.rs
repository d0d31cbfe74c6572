pub mod types;
pub mod wire;
pub mod openai;
pub mod together;
pub mod mock;
pub mod rate;
pub mod usage;
pub mod fallback;
pub mod service;

pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::OpenAiClient;
pub use service::{AiService, FallbackMode, GenerateRequest};
pub use together::TogetherClient;
pub use types::{
    resolve_model, AiResponse, ChatMessage, Completion, GenerationParams, ModelSpec, Role,
    TokenUsage, MODELS,
};

use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("{0} not configured in environment variables")]
    MissingApiKey(&'static str),

    #[error("Cannot connect to LLM provider at {0}")]
    Connection(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("LLM provider error: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("LLM returned no choices")]
    EmptyChoices,
}

/// A chat-completion backend.
///
/// Implementations are blocking; async callers go through
/// `tokio::task::spawn_blocking`.
pub trait LlmClient: Send + Sync {
    fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<Completion, LlmError>;

    /// Provider-facing model identifier.
    fn model_name(&self) -> &str;

    /// Short provider label ("openai", "deepseek", "mock").
    fn provider(&self) -> &'static str;

    /// Output budget used when the caller does not ask for one.
    fn default_max_tokens(&self) -> u32;

    /// Hard cap on requested output tokens.
    fn max_output_tokens(&self) -> u32;
}

impl<T: LlmClient + ?Sized> LlmClient for Box<T> {
    fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<Completion, LlmError> {
        (**self).complete(messages, params)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn provider(&self) -> &'static str {
        (**self).provider()
    }

    fn default_max_tokens(&self) -> u32 {
        (**self).default_max_tokens()
    }

    fn max_output_tokens(&self) -> u32 {
        (**self).max_output_tokens()
    }
}

impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<Completion, LlmError> {
        (**self).complete(messages, params)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn provider(&self) -> &'static str {
        (**self).provider()
    }

    fn default_max_tokens(&self) -> u32 {
        (**self).default_max_tokens()
    }

    fn max_output_tokens(&self) -> u32 {
        (**self).max_output_tokens()
    }
}
