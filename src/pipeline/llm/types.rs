use serde::{Deserialize, Serialize, Serializer};

// ═══════════════════════════════════════════════════════════
// Messages
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse a role name coming from clients or the conversation store.
    /// Accepts the aliases mobile clients send for the assistant side.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" | "ai" | "bot" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

// ═══════════════════════════════════════════════════════════
// Generation parameters and results
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: Option<u32>,
}

impl GenerationParams {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            max_tokens: None,
        }
    }
}

/// Token accounting for one or more completions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Estimated USD cost at GPT-4 list pricing ($0.03 / 1K prompt, $0.06 / 1K completion).
    pub fn cost_estimate(&self) -> f64 {
        (self.prompt_tokens as f64 / 1000.0) * 0.03
            + (self.completion_tokens as f64 / 1000.0) * 0.06
    }

    pub fn combined(&self, other: &TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
        }
    }
}

/// Raw completion returned by an `LlmClient`.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
}

/// Result of a generation request, including degraded results.
///
/// Serializes to the public wire shape: `message`, `sources`,
/// `tokens_used` (total only), `model`, `generation_time_ms`,
/// `finish_reason`, `error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiResponse {
    #[serde(rename = "message")]
    pub content: String,
    pub sources: Vec<String>,
    #[serde(rename = "tokens_used", serialize_with = "serialize_total_tokens")]
    pub usage: TokenUsage,
    pub model: String,
    pub generation_time_ms: u64,
    pub finish_reason: String,
    pub error: Option<String>,
}

fn serialize_total_tokens<S: Serializer>(usage: &TokenUsage, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u32(usage.total_tokens)
}

pub const FINISH_FALLBACK: &str = "fallback";
pub const FINISH_ERROR: &str = "error";
pub const FINISH_RATE_LIMITED: &str = "rate_limited";

impl AiResponse {
    /// True when the content came from a model rather than a canned reply.
    pub fn is_generated(&self) -> bool {
        !matches!(
            self.finish_reason.as_str(),
            FINISH_FALLBACK | FINISH_ERROR | FINISH_RATE_LIMITED
        )
    }
}

// ═══════════════════════════════════════════════════════════
// Model table
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub key: &'static str,
    pub name: &'static str,
    pub context_window: u32,
    pub max_tokens: u32,
}

pub const MODELS: &[ModelSpec] = &[
    ModelSpec {
        key: "gpt-4",
        name: "gpt-4",
        context_window: 8192,
        max_tokens: 2048,
    },
    ModelSpec {
        key: "gpt-4-turbo",
        name: "gpt-4-turbo-preview",
        context_window: 128_000,
        max_tokens: 4096,
    },
    ModelSpec {
        key: "gpt-3.5-turbo",
        name: "gpt-3.5-turbo",
        context_window: 4096,
        max_tokens: 2048,
    },
];

const DEFAULT_MODEL: ModelSpec = MODELS[0];

/// Look up a model by key. Unknown keys resolve to GPT-4.
pub fn resolve_model(key: &str) -> ModelSpec {
    MODELS
        .iter()
        .copied()
        .find(|m| m.key == key)
        .unwrap_or(DEFAULT_MODEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_uses_split_pricing() {
        let usage = TokenUsage::new(1000, 500);
        assert_eq!(usage.total_tokens, 1500);
        assert!((usage.cost_estimate() - 0.06).abs() < 1e-9);
    }

    #[test]
    fn combined_usage_sums_fields() {
        let a = TokenUsage::new(10, 5);
        let b = TokenUsage::new(3, 2);
        let c = a.combined(&b);
        assert_eq!(c.prompt_tokens, 13);
        assert_eq!(c.completion_tokens, 7);
        assert_eq!(c.total_tokens, 20);
    }

    #[test]
    fn unknown_model_resolves_to_gpt4() {
        assert_eq!(resolve_model("claude").name, "gpt-4");
        assert_eq!(resolve_model("gpt-4-turbo").name, "gpt-4-turbo-preview");
        assert_eq!(resolve_model("gpt-4-turbo").max_tokens, 4096);
    }

    #[test]
    fn role_parse_accepts_aliases() {
        assert_eq!(Role::parse("AI"), Some(Role::Assistant));
        assert_eq!(Role::parse(" user "), Some(Role::User));
        assert_eq!(Role::parse("moderator"), None);
    }

    #[test]
    fn ai_response_serializes_wire_shape() {
        let response = AiResponse {
            content: "hello".into(),
            sources: vec!["USA".into()],
            usage: TokenUsage::new(12, 8),
            model: "gpt-4".into(),
            generation_time_ms: 42,
            finish_reason: "stop".into(),
            error: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["message"], "hello");
        assert_eq!(json["tokens_used"], 20);
        assert_eq!(json["finish_reason"], "stop");
        assert!(json["error"].is_null());
    }

    #[test]
    fn degraded_responses_are_not_generated() {
        let mut response = AiResponse {
            content: String::new(),
            sources: vec![],
            usage: TokenUsage::default(),
            model: "gpt-4 (fallback)".into(),
            generation_time_ms: 0,
            finish_reason: FINISH_FALLBACK.into(),
            error: None,
        };
        assert!(!response.is_generated());
        response.finish_reason = "length".into();
        assert!(response.is_generated());
    }
}
