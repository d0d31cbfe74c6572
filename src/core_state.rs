//! Shared application state.
//!
//! `CoreState` owns the long-lived services behind the HTTP API: the model
//! front door, the retrieval service, the applicant-context source, the
//! conversation store and the generated-result caches. It is wrapped in
//! `Arc` at startup and shared by every handler and the background RAG
//! initializer.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::{LlmProvider, Settings};
use crate::pipeline::chat::{ChatPipeline, ConversationError, ConversationStore};
use crate::pipeline::checklist::ChecklistResult;
use crate::pipeline::context::{BackendContextClient, ContextError, ContextSource};
use crate::pipeline::llm::{AiService, FallbackMode, LlmClient, LlmError, OpenAiClient, TogetherClient};
use crate::pipeline::probability::ProbabilityResult;
use crate::pipeline::rag::RagService;
use crate::pipeline::task::{ResultSource, TaskDeps};
use crate::ttl_cache::TtlCache;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Conversation store error: {0}")]
    Conversations(#[from] ConversationError),

    #[error("LLM client error: {0}")]
    Llm(#[from] LlmError),

    #[error("Context client error: {0}")]
    Context(#[from] ContextError),
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    pub settings: Settings,
    ai: AiService,
    rag: RagService,
    contexts: Box<dyn ContextSource>,
    conversations: ConversationStore,
    /// Generated checklists by `result_cache_key`.
    checklists: Mutex<TtlCache<String, ChecklistResult>>,
    /// Generated probability reports by `result_cache_key`.
    probabilities: Mutex<TtlCache<String, ProbabilityResult>>,
    started_at: Instant,
}

impl CoreState {
    /// Assemble state from already-built services.
    pub fn new(
        settings: Settings,
        ai: AiService,
        rag: RagService,
        contexts: Box<dyn ContextSource>,
        conversations: ConversationStore,
    ) -> Self {
        let ttl = Duration::from_secs(settings.result_cache_ttl_secs);
        Self {
            settings,
            ai,
            rag,
            contexts,
            conversations,
            checklists: Mutex::new(TtlCache::new(ttl)),
            probabilities: Mutex::new(TtlCache::new(ttl)),
            started_at: Instant::now(),
        }
    }

    /// Build every service from settings.
    ///
    /// Creates blocking HTTP clients, so call this before entering the
    /// async runtime. The RAG service starts uninitialized.
    pub fn from_settings(settings: Settings) -> Result<Self, CoreError> {
        let ai = build_ai_service(&settings)?;
        tracing::info!(
            provider = ai.provider(),
            model = ai.model(),
            configured = ai.is_configured(),
            "AI service ready"
        );

        let rag = RagService::from_settings(&settings);
        let contexts = BackendContextClient::new(&settings.backend_url, settings.backend_token.clone())?;
        let conversations = ConversationStore::open(&settings.database_path)?;
        tracing::info!(path = %settings.database_path.display(), "Conversation store opened");

        Ok(Self::new(settings, ai, rag, Box::new(contexts), conversations))
    }

    // ── services ──

    pub fn ai(&self) -> &AiService {
        &self.ai
    }

    pub fn rag(&self) -> &RagService {
        &self.rag
    }

    pub fn contexts(&self) -> &dyn ContextSource {
        self.contexts.as_ref()
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn task_deps(&self) -> TaskDeps<'_> {
        TaskDeps::new(&self.ai, &self.rag, self.contexts.as_ref())
    }

    pub fn chat_pipeline(&self) -> ChatPipeline<'_> {
        ChatPipeline::new(&self.ai, &self.rag, self.contexts.as_ref()).with_conversations(&self.conversations)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    // ── result caches ──

    fn lock_checklists(&self) -> MutexGuard<'_, TtlCache<String, ChecklistResult>> {
        self.checklists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_probabilities(&self) -> MutexGuard<'_, TtlCache<String, ProbabilityResult>> {
        self.probabilities.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cached_checklist(&self, key: &str) -> Option<ChecklistResult> {
        self.lock_checklists().get(&key.to_string())
    }

    /// Only model-generated checklists are kept; fallbacks are retried.
    pub fn store_checklist(&self, key: &str, result: &ChecklistResult) {
        if result.source == ResultSource::Ai {
            self.lock_checklists().insert(key.to_string(), result.clone());
        }
    }

    pub fn cached_probability(&self, key: &str) -> Option<ProbabilityResult> {
        self.lock_probabilities().get(&key.to_string())
    }

    pub fn store_probability(&self, key: &str, result: &ProbabilityResult) {
        if result.source == ResultSource::Ai {
            self.lock_probabilities().insert(key.to_string(), result.clone());
        }
    }

    /// Drop every cached result under `key`.
    pub fn invalidate(&self, key: &str) {
        let key = key.to_string();
        self.lock_checklists().remove(&key);
        self.lock_probabilities().remove(&key);
    }
}

/// Cache key for one caller's view of an application.
///
/// The backend checks the token on every context fetch, so a cached result
/// is only reused for the same token. Requests without a token are never
/// cached. The token itself is not kept; only a SHA-256 prefix is.
pub fn result_cache_key(application_id: &str, auth_token: Option<&str>) -> Option<String> {
    let token = auth_token.map(str::trim).filter(|t| !t.is_empty())?;
    let digest = Sha256::digest(token.as_bytes());
    let fingerprint: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    Some(format!("{application_id}:{fingerprint}"))
}

fn build_ai_service(settings: &Settings) -> Result<AiService, CoreError> {
    let rph = settings.rate_limit_per_hour;
    let client: Option<Box<dyn LlmClient>> = match settings.provider {
        LlmProvider::OpenAi => match settings.openai_api_key.as_deref() {
            Some(key) => Some(Box::new(OpenAiClient::new(key, &settings.openai_model)?) as Box<dyn LlmClient>),
            None => None,
        },
        LlmProvider::DeepSeek => match settings.deepseek_api_key.as_deref() {
            Some(key) => Some(Box::new(TogetherClient::new(key)?) as Box<dyn LlmClient>),
            None => None,
        },
    };

    Ok(match client {
        Some(client) => AiService::new(client, rph),
        None => {
            let mode = match settings.provider {
                LlmProvider::OpenAi => FallbackMode::Keyword,
                LlmProvider::DeepSeek => FallbackMode::Unavailable,
            };
            tracing::warn!(provider = ?settings.provider, "No API key configured, serving fallback replies");
            AiService::unconfigured(&settings.openai_model, mode, rph)
        }
    })
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::checklist::fallback_checklist;
    use crate::pipeline::context::StaticContextSource;
    use crate::pipeline::rag::service::tests::test_service;
    use std::collections::HashMap;

    pub(crate) fn test_settings(pairs: &[(&str, &str)]) -> Settings {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned()).unwrap()
    }

    /// State over in-memory stores, a test knowledge base and the given model.
    /// Keep the `TempDir` alive for the duration of the test.
    pub(crate) fn test_state(ai: AiService, contexts: StaticContextSource) -> (CoreState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        let state = CoreState::new(
            test_settings(&[]),
            ai,
            rag,
            Box::new(contexts),
            ConversationStore::in_memory().unwrap(),
        );
        (state, dir)
    }

    fn ai_checklist() -> ChecklistResult {
        let mut result = fallback_checklist("Spain", "student", None);
        result.source = ResultSource::Ai;
        result
    }

    #[test]
    fn unconfigured_provider_uses_matching_fallback() {
        let ai = build_ai_service(&test_settings(&[])).unwrap();
        assert!(!ai.is_configured());
        assert_eq!(ai.model(), "gpt-4");

        let ai = build_ai_service(&test_settings(&[("LLM_PROVIDER", "deepseek")])).unwrap();
        assert!(!ai.is_configured());
        assert_eq!(ai.provider(), "none");
        assert_eq!(ai.model(), crate::pipeline::llm::together::DEEPSEEK_MODEL);
    }

    #[test]
    fn configured_provider_builds_client() {
        let ai = build_ai_service(&test_settings(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert!(ai.is_configured());
        assert_eq!(ai.provider(), "openai");
    }

    #[test]
    fn only_generated_results_are_cached() {
        let ai = AiService::unconfigured("gpt-4", FallbackMode::Keyword, 10);
        let (state, _dir) = test_state(ai, StaticContextSource::new());

        state.store_checklist("app-1:k", &fallback_checklist("Spain", "student", None));
        assert!(state.cached_checklist("app-1:k").is_none());

        state.store_checklist("app-1:k", &ai_checklist());
        assert_eq!(state.cached_checklist("app-1:k").unwrap().country, "Spain");
        assert!(state.cached_checklist("app-2:k").is_none());

        state.invalidate("app-1:k");
        assert!(state.cached_checklist("app-1:k").is_none());
    }

    #[test]
    fn cache_key_is_scoped_to_the_token() {
        let owner = result_cache_key("app-1", Some("owner-token")).unwrap();
        assert!(owner.starts_with("app-1:"));
        assert!(!owner.contains("owner-token"));
        assert_eq!(result_cache_key("app-1", Some(" owner-token ")).as_deref(), Some(owner.as_str()));

        let other = result_cache_key("app-1", Some("other-token")).unwrap();
        assert_ne!(owner, other);
        assert_ne!(owner, result_cache_key("app-2", Some("owner-token")).unwrap());

        assert!(result_cache_key("app-1", None).is_none());
        assert!(result_cache_key("app-1", Some("  ")).is_none());
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let ai = AiService::unconfigured("gpt-4", FallbackMode::Keyword, 10);
        let dir = tempfile::tempdir().unwrap();
        let state = CoreState::new(
            test_settings(&[("RESULT_CACHE_TTL_SECS", "0")]),
            ai,
            test_service(&dir, None),
            Box::new(StaticContextSource::new()),
            ConversationStore::in_memory().unwrap(),
        );
        state.store_checklist("app-1", &ai_checklist());
        assert!(state.cached_checklist("app-1").is_none());
    }
}
