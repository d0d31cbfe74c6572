//! Chat assistant: retrieval-grounded draft, self-review, optional rewrite.

pub mod conversation;
pub mod evaluator;

pub use conversation::{Conversation, ConversationError, ConversationStore, ReplyMeta, StoredMessage};
pub use evaluator::{Evaluation, MIN_ACCEPTABLE_SCORE};

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::pipeline::context::{AiUserContext, ContextSource};
use crate::pipeline::llm::{AiResponse, AiService, ChatMessage, GenerateRequest, Role};
use crate::pipeline::prompt::{build_system_prompt, clarification_question, extract_intent, Intent};
use crate::pipeline::rag::{RagService, RetrievalFilter};

/// Prior messages included in the prompt.
pub const MAX_HISTORY_MESSAGES: usize = 10;
const RETRIEVAL_TOP_K: usize = 5;
const TITLE_CHARS: usize = 60;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    pub content: String,
    pub user_id: String,
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
    /// Forwarded to the context backend; never part of the JSON body.
    #[serde(skip)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub score: Option<f32>,
    pub issues: Vec<String>,
    pub regenerated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub message: String,
    pub sources: Vec<String>,
    pub tokens_used: u32,
    pub model: String,
    pub generation_time_ms: u64,
    pub finish_reason: String,
    pub error: Option<String>,
    pub evaluation: EvaluationSummary,
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error(transparent)]
    Conversation(#[from] ConversationError),
}

pub struct ChatPipeline<'a> {
    ai: &'a AiService,
    rag: &'a RagService,
    contexts: &'a dyn ContextSource,
    conversations: Option<&'a ConversationStore>,
}

impl<'a> ChatPipeline<'a> {
    pub fn new(ai: &'a AiService, rag: &'a RagService, contexts: &'a dyn ContextSource) -> Self {
        Self {
            ai,
            rag,
            contexts,
            conversations: None,
        }
    }

    pub fn with_conversations(mut self, store: &'a ConversationStore) -> Self {
        self.conversations = Some(store);
        self
    }

    pub fn respond(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
        let start = Instant::now();
        tracing::info!(user_id = %request.user_id, "Received chat message");

        // Step 1: Conversation and history
        let conversation_id = self.resolve_conversation(request)?;
        let history = self.history(request, conversation_id.as_deref())?;

        // Step 2: Intent and application context
        let intent = extract_intent(&request.content);
        let application = request.application_id.as_deref().and_then(|id| {
            match self.contexts.fetch(id, request.auth_token.as_deref()) {
                Ok(ctx) => Some(ctx),
                Err(e) => {
                    tracing::warn!(application_id = id, error = %e, "Chat continuing without application context");
                    None
                }
            }
        });
        let clarification = match &application {
            None if !intent.intents.is_empty() => Some(clarification_question(&intent)),
            _ => None,
        };

        // Step 3: Retrieval
        let filter = application
            .as_ref()
            .map(|ctx| RetrievalFilter::new(Some(ctx.country()), Some(ctx.visa_type())))
            .unwrap_or_default();
        let rag = if self.rag.is_initialized() {
            Some(self.rag.retrieve_context(&request.content, &filter, RETRIEVAL_TOP_K))
        } else {
            None
        };

        // Step 4: System prompt
        let language = request.language.as_deref().unwrap_or("en");
        let app_context = application.as_ref().map(AiUserContext::application_context);
        let profile = application.as_ref().map(AiUserContext::user_profile);
        let system_prompt = build_system_prompt(language, rag.as_ref(), profile.as_ref(), app_context.as_ref());

        // Step 5: Draft
        let draft = self.generate(request, &history, &system_prompt);
        let mut usage = draft.usage;

        // Step 6: Self-evaluation and optional rewrite
        let mut summary = EvaluationSummary {
            score: None,
            issues: Vec::new(),
            regenerated: false,
        };
        let mut reply = draft;
        if reply.is_generated() {
            let (evaluation, eval_usage) =
                evaluator::evaluate(self.ai, &request.content, &reply.content, rag.as_ref());
            usage = usage.combined(&eval_usage);

            if let Some(evaluation) = evaluation {
                tracing::info!(score = evaluation.score, issues = evaluation.issues.len(), "Draft evaluated");
                summary.score = Some(evaluation.score);
                summary.issues = evaluation.issues.clone();

                if evaluation.requires_regeneration() {
                    let revised_prompt = format!(
                        "{system_prompt}\n\n{}",
                        evaluator::revision_instructions(&evaluation)
                    );
                    let revised = self.generate(request, &history, &revised_prompt);
                    usage = usage.combined(&revised.usage);
                    if revised.is_generated() {
                        tracing::info!("Using regenerated reply");
                        summary.regenerated = true;
                        reply = revised;
                    } else {
                        tracing::warn!("Regeneration degraded, keeping draft");
                    }
                }
            }
        }

        // Step 7: Persist
        if let (Some(store), Some(id)) = (self.conversations, conversation_id.as_deref()) {
            store.append(id, Role::User, &request.content)?;
            store.append_with_meta(
                id,
                Role::Assistant,
                &reply.content,
                &ReplyMeta {
                    model: Some(reply.model.clone()),
                    tokens_used: Some(usage.total_tokens),
                    evaluation_score: summary.score,
                },
            )?;
        }

        let sources = rag.as_ref().map(|ctx| ctx.sources.clone()).unwrap_or_default();
        Ok(ChatReply {
            message: reply.content,
            sources,
            tokens_used: usage.total_tokens,
            model: reply.model,
            generation_time_ms: start.elapsed().as_millis() as u64,
            finish_reason: reply.finish_reason,
            error: reply.error,
            evaluation: summary,
            intent,
            clarification,
            conversation_id,
        })
    }

    fn generate(&self, request: &ChatRequest, history: &[ChatMessage], system_prompt: &str) -> AiResponse {
        self.ai.generate(
            &GenerateRequest::new(&request.content)
                .with_history(history)
                .with_system_prompt(system_prompt)
                .with_user(&request.user_id),
        )
    }

    fn resolve_conversation(&self, request: &ChatRequest) -> Result<Option<String>, ChatError> {
        let Some(store) = self.conversations else {
            return Ok(request.conversation_id.clone());
        };
        match request.conversation_id.as_deref() {
            Some(id) if store.exists(id)? => Ok(Some(id.to_string())),
            Some(id) => Err(ChatError::ConversationNotFound(id.to_string())),
            None => {
                let title: String = request.content.chars().take(TITLE_CHARS).collect();
                let id = store.start(&request.user_id, request.application_id.as_deref(), Some(&title))?;
                Ok(Some(id))
            }
        }
    }

    /// Client-supplied history wins over stored history. System turns are
    /// dropped; the pipeline supplies its own.
    fn history(&self, request: &ChatRequest, conversation_id: Option<&str>) -> Result<Vec<ChatMessage>, ChatError> {
        let mut history: Vec<ChatMessage> = if !request.conversation_history.is_empty() {
            request.conversation_history.clone()
        } else {
            match (self.conversations, conversation_id) {
                (Some(store), Some(id)) => store.history(id, MAX_HISTORY_MESSAGES)?,
                _ => Vec::new(),
            }
        };
        history.retain(|m| m.role != Role::System);
        let excess = history.len().saturating_sub(MAX_HISTORY_MESSAGES);
        history.drain(..excess);
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::tests::sample_context;
    use crate::pipeline::context::StaticContextSource;
    use crate::pipeline::llm::{FallbackMode, LlmClient, MockLlmClient, ScriptedLlmClient};
    use crate::pipeline::rag::service::tests::test_service;
    use std::sync::Arc;

    fn scripted(replies: &[&str]) -> (Arc<ScriptedLlmClient>, AiService) {
        let client = Arc::new(ScriptedLlmClient::replies(replies));
        let ai = AiService::new(Box::new(Arc::clone(&client)) as Box<dyn LlmClient>, 100);
        (client, ai)
    }

    fn request(content: &str) -> ChatRequest {
        ChatRequest {
            content: content.into(),
            user_id: "user-1".into(),
            ..Default::default()
        }
    }

    #[test]
    fn good_draft_is_kept() {
        let (client, ai) = scripted(&["Draft answer", r#"{"score": 9, "issues": [], "needs_regeneration": false}"#]);
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        let contexts = StaticContextSource::new();

        let reply = ChatPipeline::new(&ai, &rag, &contexts)
            .respond(&request("Hello there"))
            .unwrap();
        assert_eq!(reply.message, "Draft answer");
        assert_eq!(reply.evaluation.score, Some(9.0));
        assert!(!reply.evaluation.regenerated);
        assert_eq!(reply.tokens_used, 60);
        assert_eq!(client.call_count(), 2);
        assert!(reply.clarification.is_none());
    }

    #[test]
    fn low_score_triggers_one_regeneration() {
        let (client, ai) = scripted(&[
            "The fee is $9999",
            r#"{"score": 3, "issues": ["Invented fee"], "needs_regeneration": true}"#,
            "The fee is listed on the embassy website.",
        ]);
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        let contexts = StaticContextSource::new();

        let reply = ChatPipeline::new(&ai, &rag, &contexts)
            .respond(&request("How much does it cost?"))
            .unwrap();
        assert_eq!(reply.message, "The fee is listed on the embassy website.");
        assert!(reply.evaluation.regenerated);
        assert_eq!(reply.evaluation.issues, vec!["Invented fee"]);
        assert_eq!(reply.tokens_used, 90);
        assert_eq!(client.call_count(), 3);

        let revised_system = &client.messages_for_call(2).unwrap()[0].content;
        assert!(revised_system.contains("**QUALITY REVIEW**"));
        assert!(revised_system.contains("- Invented fee"));
    }

    #[test]
    fn degraded_regeneration_keeps_draft() {
        let (_, ai) = scripted(&["Draft", r#"{"score": 2}"#]);
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        let contexts = StaticContextSource::new();

        let reply = ChatPipeline::new(&ai, &rag, &contexts)
            .respond(&request("hi"))
            .unwrap();
        assert_eq!(reply.message, "Draft");
        assert!(!reply.evaluation.regenerated);
    }

    #[test]
    fn unparseable_evaluation_accepts_draft() {
        let (client, ai) = scripted(&["Draft", "I think it is fine"]);
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        let contexts = StaticContextSource::new();

        let reply = ChatPipeline::new(&ai, &rag, &contexts)
            .respond(&request("hi"))
            .unwrap();
        assert_eq!(reply.message, "Draft");
        assert_eq!(reply.evaluation.score, None);
        assert_eq!(client.call_count(), 2);
    }

    #[test]
    fn fallback_draft_skips_evaluation() {
        let ai = AiService::unconfigured("gpt-4", FallbackMode::Keyword, 100);
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        let contexts = StaticContextSource::new();

        let reply = ChatPipeline::new(&ai, &rag, &contexts)
            .respond(&request("What documents do I need for Spain?"))
            .unwrap();
        assert_eq!(reply.finish_reason, "fallback");
        assert_eq!(reply.evaluation.score, None);
        assert!(reply.intent.has("requirements"));
        assert_eq!(reply.intent.target_country, Some("spain"));
        assert!(reply.clarification.unwrap().starts_with("What type of visa"));
    }

    #[test]
    fn application_context_filters_retrieval() {
        let (client, ai) = scripted(&["Answer", r#"{"score": 8}"#]);
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        rag.initialize();
        let mut context = sample_context();
        context.application.country = Some("UK".into());
        context.application.visa_type = Some("Work".into());
        let contexts = StaticContextSource::any(context);

        let mut req = request("What documents do I need?");
        req.application_id = Some("app-1".into());
        let reply = ChatPipeline::new(&ai, &rag, &contexts).respond(&req).unwrap();

        assert_eq!(reply.sources, vec!["UK"]);
        assert!(reply.clarification.is_none());
        let system = &client.messages_for_call(0).unwrap()[0].content;
        assert!(system.contains("**Source: UK"));
        assert!(system.contains("LANGUAGE FROM CONTEXT"));
    }

    #[test]
    fn history_is_trimmed_and_system_turns_dropped() {
        let (client, ai) = scripted(&["ok", r#"{"score": 10}"#]);
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        let contexts = StaticContextSource::new();

        let mut req = request("latest");
        req.conversation_history.push(ChatMessage::system("ignore me"));
        for i in 0..14 {
            req.conversation_history.push(ChatMessage::user(format!("turn {i}")));
        }
        ChatPipeline::new(&ai, &rag, &contexts).respond(&req).unwrap();

        let messages = client.messages_for_call(0).unwrap();
        // system + 10 history + user
        assert_eq!(messages.len(), 12);
        assert_eq!(messages[1].content, "turn 4");
        assert_eq!(messages[11].content, "latest");
    }

    #[test]
    fn conversation_is_created_and_reused() {
        let ai = AiService::new(Box::new(MockLlmClient::new(r#"{"score": 9}"#)), 100);
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        let contexts = StaticContextSource::new();
        let store = ConversationStore::in_memory().unwrap();
        let pipeline = ChatPipeline::new(&ai, &rag, &contexts).with_conversations(&store);

        let first = pipeline.respond(&request("first question")).unwrap();
        let id = first.conversation_id.clone().unwrap();

        let mut follow_up = request("second question");
        follow_up.conversation_id = Some(id.clone());
        pipeline.respond(&follow_up).unwrap();

        let conv = store.get(&id).unwrap().unwrap();
        assert_eq!(conv.title.as_deref(), Some("first question"));
        assert_eq!(conv.messages.len(), 4);
        assert_eq!(conv.messages[2].content, "second question");
        assert_eq!(conv.messages[3].evaluation_score, Some(9.0));

        let mut unknown = request("x");
        unknown.conversation_id = Some("missing".into());
        assert!(matches!(
            pipeline.respond(&unknown),
            Err(ChatError::ConversationNotFound(_))
        ));
    }
}
