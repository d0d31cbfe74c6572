use super::types::{ChatMessage, Completion, GenerationParams};
use super::wire::{ChatCompletionRequest, ChatEndpoint};
use super::{LlmClient, LlmError};

const TOGETHER_URL: &str = "https://api.together.xyz/v1/chat/completions";
pub const DEEPSEEK_MODEL: &str = "deepseek-ai/DeepSeek-R1";
const TOGETHER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_TOKENS: u32 = 2048;
const MAX_TOKENS_CAP: u32 = 8192;

/// DeepSeek-R1 served through Together.ai's OpenAI-compatible endpoint.
pub struct TogetherClient {
    endpoint: ChatEndpoint,
}

impl TogetherClient {
    pub fn new(api_key: &str) -> Result<Self, LlmError> {
        Self::with_url(TOGETHER_URL, api_key)
    }

    /// Client against an explicit chat-completions URL.
    pub fn with_url(url: &str, api_key: &str) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey("DEEPSEEK_API_KEY"));
        }
        tracing::info!(model = DEEPSEEK_MODEL, "Together client configured");
        Ok(Self {
            endpoint: ChatEndpoint::new(url.to_string(), api_key.to_string(), TOGETHER_TIMEOUT_SECS)?,
        })
    }
}

impl LlmClient for TogetherClient {
    fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<Completion, LlmError> {
        let max_tokens = params
            .max_tokens
            .map(|n| n.min(MAX_TOKENS_CAP))
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let body = ChatCompletionRequest {
            model: DEEPSEEK_MODEL,
            messages,
            temperature: params.temperature,
            max_tokens,
            top_p: None,
            stream: Some(false),
        };

        tracing::debug!(url = self.endpoint.url(), max_tokens, "Together request");
        self.endpoint.send(&body)
    }

    fn model_name(&self) -> &str {
        DEEPSEEK_MODEL
    }

    fn provider(&self) -> &'static str {
        "deepseek"
    }

    fn default_max_tokens(&self) -> u32 {
        DEFAULT_MAX_TOKENS
    }

    fn max_output_tokens(&self) -> u32 {
        MAX_TOKENS_CAP
    }
}
