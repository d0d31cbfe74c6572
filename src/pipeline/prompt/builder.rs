use serde::{Deserialize, Serialize};

use super::Language;
use crate::pipeline::llm::ChatMessage;
use crate::pipeline::rag::types::RetrievedContext;

/// Application snapshot injected into the system prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationContext {
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub visa_type: Option<String>,
    pub status: Option<String>,
    pub processing_days: Option<u32>,
    pub fee: Option<f64>,
    pub documents_total: Option<u32>,
    pub documents_uploaded: Option<u32>,
    pub documents_verified: Option<u32>,
    pub documents_pending: Option<u32>,
    pub documents_rejected: Option<u32>,
    pub missing_documents: Vec<String>,
    pub checkpoints_completed: Option<u32>,
    pub checkpoints_total: Option<u32>,
    pub next_checkpoint: Option<String>,
    pub user_language: Option<String>,
    pub app_language: Option<String>,
}

impl ApplicationContext {
    fn language(&self) -> Option<&str> {
        non_empty(&self.user_language).or_else(|| non_empty(&self.app_language))
    }
}

/// Applicant profile injected into the system prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub nationality: Option<String>,
    pub target_country: Option<String>,
    pub visa_type: Option<String>,
    pub status: Option<String>,
    pub collected_docs: Option<u32>,
    pub total_docs: Option<u32>,
    pub processing_time: Option<String>,
    pub visa_fee: Option<String>,
    #[serde(rename = "appLanguage")]
    pub app_language: Option<String>,
    pub language: Option<String>,
}

impl UserProfile {
    fn language(&self) -> Option<&str> {
        non_empty(&self.app_language).or_else(|| non_empty(&self.language))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn or_default<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
    non_empty(value).unwrap_or(default)
}

/// Response language: the requested one, overridden by the application
/// context, overridden in turn by the user profile.
pub fn resolve_language(
    requested: &str,
    application: Option<&ApplicationContext>,
    profile: Option<&UserProfile>,
) -> String {
    let mut language = requested.to_string();
    if let Some(lang) = application.and_then(ApplicationContext::language) {
        language = lang.to_string();
    }
    if let Some(lang) = profile.and_then(UserProfile::language) {
        language = lang.to_string();
    }
    language
}

fn language_instruction(language: Language) -> &'static str {
    match language {
        Language::En => "**LANGUAGE INSTRUCTION**: You must respond in English. All your responses should be in English. Check the userProfile.appLanguage field in the JSON context to confirm the user's language preference.",
        Language::Ru => "**LANGUAGE INSTRUCTION**: Вы должны отвечать на русском языке. Все ваши ответы должны быть на русском языке. Проверьте поле userProfile.appLanguage в JSON-контексте, чтобы подтвердить языковые предпочтения пользователя.",
        Language::Uz => "**LANGUAGE INSTRUCTION**: Siz o'zbek tilida javob berishingiz kerak. Barcha javoblaringiz o'zbek tilida bo'lishi kerak. Foydalanuvchining til afzalligini tasdiqlash uchun JSON kontekstidagi userProfile.appLanguage maydonini tekshiring.",
    }
}

const LANGUAGE_REMINDER: &str = "**REMINDER**: The LANGUAGE RULES section in the system prompt specifies that you must check userProfile.appLanguage in the JSON context and respond accordingly. Do not mix languages in one answer.";
const RAG_IMPORTANT: &str = "**IMPORTANT**: Use the RAG documents above as your primary source of information. Prioritize this information over general knowledge.";
const RAG_EMPTY_NOTE: &str = "**NOTE**: No relevant RAG documents found for this query. If you are uncertain about any visa requirements, explicitly state your uncertainty and advise contacting the embassy.";
const APPLICATION_IMPORTANT: &str = "**IMPORTANT**: Use the structured user context above to personalize your response. Reference their specific application details when relevant.";

/// Assemble the full system prompt for a generation call.
pub fn build_system_prompt(
    language: &str,
    rag: Option<&RetrievedContext>,
    profile: Option<&UserProfile>,
    application: Option<&ApplicationContext>,
) -> String {
    let resolved = resolve_language(language, application, profile);

    let mut prompt = String::from(Language::En.base_prompt());
    prompt.push_str("\n\n");
    prompt.push_str(language_instruction(Language::from_code(&resolved)));
    prompt.push_str("\n\n");
    prompt.push_str(LANGUAGE_REMINDER);

    match rag {
        Some(ctx) if !ctx.documents.is_empty() => {
            prompt.push_str("\n\n");
            prompt.push_str(&format_rag_context(ctx));
            prompt.push_str("\n\n");
            prompt.push_str(RAG_IMPORTANT);
        }
        Some(_) => {
            prompt.push_str("\n\n");
            prompt.push_str(RAG_EMPTY_NOTE);
        }
        None => {}
    }

    if let Some(app) = application {
        prompt.push_str("\n\n");
        prompt.push_str(&format_application_context(app));
        prompt.push_str("\n\n");
        prompt.push_str(APPLICATION_IMPORTANT);
        if let Some(lang) = app.language() {
            prompt.push_str(&format!(
                "\n\n**LANGUAGE FROM CONTEXT**: The user's app language is {lang}. You MUST respond in {lang} language as specified in the context."
            ));
        }
    }

    if let Some(profile) = profile {
        prompt.push_str("\n\n");
        prompt.push_str(&format_user_profile(profile));
        if let Some(lang) = profile.language() {
            prompt.push_str(&format!(
                "\n\n**LANGUAGE FROM USER PROFILE**: The user's app language is {lang}. You MUST respond in {lang} language."
            ));
        }
    }

    prompt
}

fn format_rag_context(ctx: &RetrievedContext) -> String {
    let query = if ctx.query.trim().is_empty() {
        "your question"
    } else {
        ctx.query.as_str()
    };
    let documents = ctx
        .documents
        .iter()
        .map(|doc| {
            format!(
                "**Source: {} ({})**\n{}",
                doc.source,
                doc.doc_type.to_uppercase(),
                doc.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("\nBased on your question about {query}, here's relevant information:\n\n{documents}\n\n---\n")
}

fn format_application_context(app: &ApplicationContext) -> String {
    let missing = if app.missing_documents.is_empty() {
        "None".to_string()
    } else {
        app.missing_documents.join(", ")
    };
    let user_language = app.language().unwrap_or("en");
    let count = |v: Option<u32>| v.unwrap_or(0);

    format!(
        "\n**USER'S CURRENT VISA APPLICATION:**\n\n\
         **Destination**: {country} ({code})\n\
         **Visa Type**: {visa_type}\n\
         **Application Status**: {status}\n\
         **Processing Time**: {days} days\n\
         **Visa Fee**: ${fee}\n\n\
         **DOCUMENT STATUS:**\n\
         - Total Required: {total}\n\
         - Uploaded: {uploaded}\n\
         - Verified: {verified}\n\
         - Pending Review: {pending}\n\
         - Rejected: {rejected}\n\n\
         **MISSING DOCUMENTS**: {missing}\n\n\
         **PROGRESS:**\n\
         - Checkpoints Completed: {done} of {checkpoints}\n\
         - Next Step: {next}\n\n\
         **USER LANGUAGE**: {user_language} (from application context)\n\n\
         **IMPORTANT**: Use this specific application context to provide personalized advice. \n\
         If user asks about documents, refer to their specific missing documents.\n\
         If user asks about next steps, refer to their next checkpoint.\n\
         Always respond in {user_language} language as specified in the context.\n",
        country = or_default(&app.country, "Unknown"),
        code = or_default(&app.country_code, "XX"),
        visa_type = or_default(&app.visa_type, "Not specified"),
        status = or_default(&app.status, "Draft"),
        days = app.processing_days.unwrap_or(14),
        fee = app.fee.unwrap_or(0.0),
        total = count(app.documents_total),
        uploaded = count(app.documents_uploaded),
        verified = count(app.documents_verified),
        pending = count(app.documents_pending),
        rejected = count(app.documents_rejected),
        done = count(app.checkpoints_completed),
        checkpoints = count(app.checkpoints_total),
        next = or_default(&app.next_checkpoint, "Complete all documents"),
    )
}

fn format_user_profile(profile: &UserProfile) -> String {
    format!(
        "\n**User's Application Context:**\n\
         - Target Country: {}\n\
         - Visa Type: {}\n\
         - Application Status: {}\n\
         - Documents Collected: {}/{}\n\
         - Processing Time: {} days\n\
         - Visa Fee: {}\n\n",
        or_default(&profile.target_country, "Not specified"),
        or_default(&profile.visa_type, "Not specified"),
        or_default(&profile.status, "Not started"),
        profile.collected_docs.unwrap_or(0),
        profile.total_docs.unwrap_or(0),
        or_default(&profile.processing_time, "TBD"),
        or_default(&profile.visa_fee, "TBD"),
    )
}

/// Message list for a chat completion: system, prior turns, user.
/// Without an explicit system prompt the language's base prompt is used.
pub fn build_messages(
    user_message: &str,
    history: &[ChatMessage],
    system_prompt: Option<&str>,
    language: Language,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(
        system_prompt.unwrap_or(language.base_prompt()),
    ));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(user_message));
    messages
}
