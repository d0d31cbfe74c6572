use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use super::fallback::{keyword_reply, unavailable_reply, RATE_LIMITED_REPLY};
use super::rate::{RateInfo, SlidingWindowLimiter};
use super::types::{
    resolve_model, AiResponse, ChatMessage, GenerationParams, TokenUsage, FINISH_ERROR,
    FINISH_FALLBACK, FINISH_RATE_LIMITED,
};
use super::together::DEEPSEEK_MODEL;
use super::usage::{UsageLog, UsageStats};
use super::{LlmClient, LlmError};
use crate::pipeline::prompt::{build_messages, Language};

/// How the service answers when the model cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMode {
    /// Keyword-matched canned guidance (`finish_reason = "fallback"`).
    Keyword,
    /// A short "temporarily unavailable" notice (`finish_reason = "error"`).
    Unavailable,
}

/// One generation request.
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub user_message: &'a str,
    pub history: &'a [ChatMessage],
    pub system_prompt: Option<&'a str>,
    pub user_id: Option<&'a str>,
    /// Selects the base system prompt when `system_prompt` is absent.
    pub language: Option<Language>,
    pub params: GenerationParams,
}

impl<'a> GenerateRequest<'a> {
    pub fn new(user_message: &'a str) -> Self {
        Self {
            user_message,
            history: &[],
            system_prompt: None,
            user_id: None,
            language: None,
            params: GenerationParams::default(),
        }
    }

    pub fn with_history(mut self, history: &'a [ChatMessage]) -> Self {
        self.history = history;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: &'a str) -> Self {
        self.system_prompt = Some(system_prompt);
        self
    }

    pub fn with_user(mut self, user_id: &'a str) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }
}

/// Front door for every model call.
///
/// Applies the per-user quota, clamps the output budget, records token
/// usage and turns provider failures into degraded `AiResponse`s instead
/// of errors.
pub struct AiService {
    client: Option<Box<dyn LlmClient>>,
    fallback_model: String,
    fallback_mode: FallbackMode,
    limiter: Mutex<SlidingWindowLimiter>,
    usage: Mutex<UsageLog>,
}

impl AiService {
    pub fn new(client: Box<dyn LlmClient>, requests_per_hour: u32) -> Self {
        let fallback_mode = match client.provider() {
            "deepseek" => FallbackMode::Unavailable,
            _ => FallbackMode::Keyword,
        };
        Self {
            fallback_model: client.model_name().to_string(),
            client: Some(client),
            fallback_mode,
            limiter: Mutex::new(SlidingWindowLimiter::per_hour(requests_per_hour)),
            usage: Mutex::new(UsageLog::new()),
        }
    }

    /// Service with no model behind it. Every request is answered from the
    /// fallback path; `model_key` only labels the replies.
    pub fn unconfigured(model_key: &str, fallback_mode: FallbackMode, requests_per_hour: u32) -> Self {
        let fallback_model = match fallback_mode {
            FallbackMode::Keyword => resolve_model(model_key).name.to_string(),
            FallbackMode::Unavailable => DEEPSEEK_MODEL.to_string(),
        };
        Self {
            client: None,
            fallback_model,
            fallback_mode,
            limiter: Mutex::new(SlidingWindowLimiter::per_hour(requests_per_hour)),
            usage: Mutex::new(UsageLog::new()),
        }
    }

    pub fn with_fallback_mode(mut self, mode: FallbackMode) -> Self {
        self.fallback_mode = mode;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub fn model(&self) -> &str {
        self.client
            .as_ref()
            .map(|c| c.model_name())
            .unwrap_or(&self.fallback_model)
    }

    pub fn provider(&self) -> &'static str {
        self.client.as_ref().map(|c| c.provider()).unwrap_or("none")
    }

    pub fn check_rate_limit(&self, user_id: &str) -> (bool, RateInfo) {
        self.limiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .check(user_id)
    }

    pub fn usage_stats(&self, user_id: Option<&str>) -> UsageStats {
        self.usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats(user_id)
    }

    pub fn clear_usage_log(&self) {
        self.usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Generate a reply. Never fails: quota, configuration and provider
    /// problems come back as degraded responses with `error` set.
    pub fn generate(&self, request: &GenerateRequest<'_>) -> AiResponse {
        let start = Instant::now();

        // Step 1: Per-user quota
        if let Some(user_id) = request.user_id {
            let (allowed, info) = self.check_rate_limit(user_id);
            if !allowed {
                tracing::warn!(user_id, limit = info.limit, "Generation rate limit exceeded");
                return self.degraded(
                    RATE_LIMITED_REPLY.to_string(),
                    self.model().to_string(),
                    FINISH_RATE_LIMITED,
                    Some(format!(
                        "Rate limit: {}/{} requests used",
                        info.current_requests, info.limit
                    )),
                    start,
                );
            }
        }

        // Step 2: No model configured
        let Some(client) = self.client.as_ref() else {
            tracing::warn!("LLM not configured, answering from fallback");
            return self.fallback(request.user_message, None, start);
        };

        // Step 3: Clamp output budget
        let max_tokens = request
            .params
            .max_tokens
            .unwrap_or(client.default_max_tokens())
            .min(client.max_output_tokens());
        let params = GenerationParams {
            max_tokens: Some(max_tokens),
            ..request.params
        };

        // Step 4: Assemble messages
        let messages = match (request.system_prompt, request.language) {
            (None, None) => {
                let mut messages = request.history.to_vec();
                messages.push(ChatMessage::user(request.user_message));
                messages
            }
            (system, language) => build_messages(
                request.user_message,
                request.history,
                system,
                language.unwrap_or_default(),
            ),
        };

        // Step 5: Call the provider
        match client.complete(&messages, &params) {
            Ok(completion) => {
                self.usage
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record(request.user_id, client.model_name(), &completion.usage);

                AiResponse {
                    content: completion.content,
                    sources: vec![],
                    usage: completion.usage,
                    model: client.model_name().to_string(),
                    generation_time_ms: start.elapsed().as_millis() as u64,
                    finish_reason: completion.finish_reason,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, provider = client.provider(), "LLM call failed");
                self.fallback(request.user_message, Some(e), start)
            }
        }
    }

    fn fallback(&self, user_message: &str, err: Option<LlmError>, start: Instant) -> AiResponse {
        match self.fallback_mode {
            FallbackMode::Keyword => {
                let (keyword, reply) = keyword_reply(user_message);
                tracing::info!(keyword, "Using fallback response");
                self.degraded(
                    reply.to_string(),
                    format!("{} (fallback)", self.fallback_model),
                    FINISH_FALLBACK,
                    err.map(|e| e.to_string()),
                    start,
                )
            }
            FallbackMode::Unavailable => {
                let err = err.unwrap_or(LlmError::MissingApiKey("DEEPSEEK_API_KEY"));
                let (reply, error) = unavailable_reply(&err);
                self.degraded(
                    reply.to_string(),
                    self.fallback_model.clone(),
                    FINISH_ERROR,
                    Some(error),
                    start,
                )
            }
        }
    }

    fn degraded(
        &self,
        content: String,
        model: String,
        finish_reason: &str,
        error: Option<String>,
        start: Instant,
    ) -> AiResponse {
        AiResponse {
            content,
            sources: vec![],
            usage: TokenUsage::default(),
            model,
            generation_time_ms: start.elapsed().as_millis() as u64,
            finish_reason: finish_reason.to_string(),
            error,
        }
    }
}
