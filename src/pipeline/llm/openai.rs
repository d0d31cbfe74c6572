use super::types::{resolve_model, ChatMessage, Completion, GenerationParams, ModelSpec};
use super::wire::{ChatCompletionRequest, ChatEndpoint};
use super::{LlmClient, LlmError};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OPENAI_TIMEOUT_SECS: u64 = 60;

/// OpenAI chat-completions client.
pub struct OpenAiClient {
    endpoint: ChatEndpoint,
    model: ModelSpec,
}

impl OpenAiClient {
    /// Client against the public OpenAI API. `model_key` is looked up in
    /// the model table (unknown keys fall back to GPT-4).
    pub fn new(api_key: &str, model_key: &str) -> Result<Self, LlmError> {
        Self::with_base_url(OPENAI_BASE_URL, api_key, model_key)
    }

    pub fn with_base_url(base_url: &str, api_key: &str, model_key: &str) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey("OPENAI_API_KEY"));
        }
        let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
        let model = resolve_model(model_key);
        tracing::info!(model = model.name, "OpenAI client configured");
        Ok(Self {
            endpoint: ChatEndpoint::new(url, api_key.to_string(), OPENAI_TIMEOUT_SECS)?,
            model,
        })
    }

    pub fn model_spec(&self) -> ModelSpec {
        self.model
    }
}

impl LlmClient for OpenAiClient {
    fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<Completion, LlmError> {
        let max_tokens = params
            .max_tokens
            .unwrap_or(self.model.max_tokens)
            .min(self.model.max_tokens);

        let body = ChatCompletionRequest {
            model: self.model.name,
            messages,
            temperature: params.temperature,
            max_tokens,
            top_p: Some(params.top_p),
            stream: None,
        };

        self.endpoint.send(&body)
    }

    fn model_name(&self) -> &str {
        self.model.name
    }

    fn provider(&self) -> &'static str {
        "openai"
    }

    fn default_max_tokens(&self) -> u32 {
        self.model.max_tokens
    }

    fn max_output_tokens(&self) -> u32 {
        self.model.max_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::wire::test_server;
    use axum::http::StatusCode;

    #[test]
    fn empty_key_is_rejected() {
        let result = OpenAiClient::new("  ", "gpt-4");
        assert!(matches!(result, Err(LlmError::MissingApiKey("OPENAI_API_KEY"))));
    }

    #[tokio::test]
    async fn completes_against_compatible_server() {
        let base = test_server::spawn(
            StatusCode::OK,
            serde_json::json!({
                "choices": [{"message": {"content": "Bring your passport."}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 20, "completion_tokens": 4, "total_tokens": 24}
            }),
        )
        .await;

        let completion = tokio::task::spawn_blocking(move || {
            let client = OpenAiClient::with_base_url(&base, "sk-test", "gpt-3.5-turbo").unwrap();
            assert_eq!(client.model_name(), "gpt-3.5-turbo");
            client.complete(&[ChatMessage::user("docs?")], &GenerationParams::default())
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(completion.content, "Bring your passport.");
        assert_eq!(completion.usage.total_tokens, 24);
    }

    #[tokio::test]
    async fn non_success_status_surfaces_body() {
        let base = test_server::spawn(
            StatusCode::TOO_MANY_REQUESTS,
            serde_json::json!({"error": "quota"}),
        )
        .await;

        let result = tokio::task::spawn_blocking(move || {
            let client = OpenAiClient::with_base_url(&base, "sk-test", "gpt-4").unwrap();
            client.complete(&[ChatMessage::user("hi")], &GenerationParams::default())
        })
        .await
        .unwrap();

        match result {
            Err(LlmError::Status { status, body }) => {
                assert_eq!(status, 429);
                assert!(body.contains("quota"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_connection_error() {
        let result = tokio::task::spawn_blocking(|| {
            let client = OpenAiClient::with_base_url("http://127.0.0.1:9", "sk-test", "gpt-4").unwrap();
            client.complete(&[ChatMessage::user("hi")], &GenerationParams::default())
        })
        .await
        .unwrap();

        assert!(matches!(result, Err(LlmError::Connection(_))));
    }
}
