//! Uploaded document validation against the expected document type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pipeline::json_repair::{string_field, string_list};
use crate::pipeline::llm::{GenerateRequest, GenerationParams};
use crate::pipeline::prompt::{build_system_prompt, ApplicationContext, Language};
use crate::pipeline::rag::RetrievalFilter;
use crate::pipeline::task::{policy_extracts, ResultSource, TaskDeps, TaskError};

/// Extracted text beyond this many characters is cut from the prompt.
const MAX_DOCUMENT_CHARS: usize = 6000;

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationRequest {
    #[serde(default)]
    pub application_id: Option<String>,
    pub document_type: String,
    #[serde(default)]
    pub document_name: Option<String>,
    #[serde(default)]
    pub extracted_text: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub visa_type: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Approved,
    Rejected,
    NeedsReview,
}

impl ValidationStatus {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "approved" => ValidationStatus::Approved,
            "rejected" => ValidationStatus::Rejected,
            _ => ValidationStatus::NeedsReview,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub document_type: String,
    pub status: ValidationStatus,
    pub confidence: f32,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub summary: String,
    pub source: ResultSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn validate(deps: &TaskDeps<'_>, request: &ValidationRequest) -> ValidationResult {
    let language = Language::from_code(&request.language);
    tracing::info!(
        document_type = %request.document_type,
        application_id = request.application_id.as_deref().unwrap_or("-"),
        "Validating document"
    );

    if request.extracted_text.trim().is_empty() {
        tracing::warn!(document_type = %request.document_type, "No extracted text, skipping AI validation");
        return fallback_validation(&request.document_type, language, Some("No text could be extracted from the document"));
    }

    // Step 1: Retrieval for the destination's document rules
    let rag = request.country.as_deref().and_then(|country| {
        let visa_type = request.visa_type.as_deref();
        let query = format!(
            "{country} {} {} document requirements",
            visa_type.unwrap_or("visa"),
            request.document_type
        );
        deps.retrieve(&query, &RetrievalFilter::new(Some(country), visa_type), 5)
    });

    // Step 2: Prompts
    let application = ApplicationContext {
        country: request.country.clone(),
        visa_type: request.visa_type.clone(),
        ..Default::default()
    };
    let mut system_prompt = build_system_prompt(language.code(), rag.as_ref(), None, Some(&application));
    system_prompt.push_str("\n\n");
    system_prompt.push_str(VALIDATOR_INSTRUCTIONS);
    let user_message = validation_prompt(request, &policy_extracts(rag.as_ref()), language);

    // Step 3: Generate and repair
    let mut generate_request = GenerateRequest::new(&user_message)
        .with_system_prompt(&system_prompt)
        .with_params(GenerationParams::default().with_temperature(0.2).with_max_tokens(800));
    if let Some(user_id) = request.user_id.as_deref() {
        generate_request = generate_request.with_user(user_id);
    }

    match deps.generate_json(&generate_request, |map| parse_validation(map, &request.document_type)) {
        Ok((result, _)) => {
            tracing::info!(status = ?result.status, confidence = result.confidence, "Document validated");
            result
        }
        Err(e) => {
            tracing::error!(error = %e, "Document validation failed, using fallback");
            fallback_validation(&request.document_type, language, Some(&e.to_string()))
        }
    }
}

fn parse_validation(map: Map<String, Value>, document_type: &str) -> Result<ValidationResult, TaskError> {
    let status = string_field(&map, "status")
        .map(|s| ValidationStatus::parse(&s))
        .unwrap_or(ValidationStatus::NeedsReview);
    let confidence = map
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c.clamp(0.0, 1.0) as f32)
        .unwrap_or(0.0);

    Ok(ValidationResult {
        document_type: document_type.to_string(),
        status,
        confidence,
        issues: string_list(&map, "issues"),
        suggestions: string_list(&map, "suggestions"),
        summary: string_field(&map, "summary").unwrap_or_default(),
        source: ResultSource::Ai,
        error: None,
    })
}

/// Manual-review verdict used whenever the model cannot judge the document.
pub fn fallback_validation(document_type: &str, language: Language, error: Option<&str>) -> ValidationResult {
    let (issue, summary) = match language {
        Language::Uz => (
            "Avtomatik tekshiruv mavjud emas. Hujjat qo'lda ko'rib chiqiladi.",
            "Hujjat qo'lda tekshirishni talab qiladi.",
        ),
        Language::Ru => (
            "Автоматическая проверка недоступна. Документ будет проверен вручную.",
            "Документ требует ручной проверки.",
        ),
        Language::En => (
            "Automatic validation is unavailable. The document will be reviewed manually.",
            "The document requires manual review.",
        ),
    };

    ValidationResult {
        document_type: document_type.to_string(),
        status: ValidationStatus::NeedsReview,
        confidence: 0.0,
        issues: vec![issue.to_string()],
        suggestions: vec![],
        summary: summary.to_string(),
        source: ResultSource::Fallback,
        error: error.map(str::to_string),
    }
}

const VALIDATOR_INSTRUCTIONS: &str = "**Document validation instructions:**\n\n\
1. Decide whether the document text matches the expected document type and is usable for the visa application.\n\
2. Use \"approved\" only when the document is clearly the right type, legible and not expired.\n\
3. Use \"rejected\" when it is the wrong document, expired or missing essential information.\n\
4. Use \"needs_review\" when you are not sure.\n\
5. Respond in JSON format - JSON only, no additional text.";

fn validation_prompt(request: &ValidationRequest, extracts: &str, language: Language) -> String {
    let text: String = request.extracted_text.chars().take(MAX_DOCUMENT_CHARS).collect();
    let language_name = match language {
        Language::En => "English",
        Language::Ru => "Russian",
        Language::Uz => "Uzbek (Latin script)",
    };

    format!(
        "Validate the uploaded visa document.\n\n\
         EXPECTED DOCUMENT TYPE: {document_type}\n\
         FILE NAME: {name}\n\
         DESTINATION: {country}\n\
         VISA TYPE: {visa_type}\n\n\
         RELEVANT VISA RULES:\n{extracts}\n\n\
         EXTRACTED TEXT:\n\"\"\"\n{text}\n\"\"\"\n\n\
         Write issues, suggestions and summary in {language_name}.\n\n\
         Output MUST be a JSON object matching this template:\n\
         ```json\n{{\n  \"status\": \"approved\" | \"rejected\" | \"needs_review\",\n  \"confidence\": 0.0,\n  \"issues\": [\"...\"],\n  \"suggestions\": [\"...\"],\n  \"summary\": \"...\"\n}}\n```",
        document_type = request.document_type,
        name = request.document_name.as_deref().unwrap_or("unknown"),
        country = request.country.as_deref().unwrap_or("unknown"),
        visa_type = request.visa_type.as_deref().unwrap_or("unknown"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::StaticContextSource;
    use crate::pipeline::llm::{AiService, LlmClient, ScriptedLlmClient};
    use crate::pipeline::rag::service::tests::test_service;
    use crate::pipeline::retry::RetryPolicy;
    use crate::pipeline::task::tests::scripted_ai;
    use serde_json::json;
    use std::sync::Arc;

    fn request(text: &str) -> ValidationRequest {
        ValidationRequest {
            application_id: Some("app-1".into()),
            document_type: "passport".into(),
            document_name: Some("passport.pdf".into()),
            extracted_text: text.into(),
            country: Some("UK".into()),
            visa_type: Some("Work".into()),
            language: "en".into(),
            user_id: None,
        }
    }

    #[test]
    fn model_verdict_is_repaired() {
        let map = json!({"status": "APPROVED", "confidence": 1.7, "issues": ["none", 1]})
            .as_object()
            .unwrap()
            .clone();
        let result = parse_validation(map, "passport").unwrap();
        assert_eq!(result.status, ValidationStatus::Approved);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.issues, vec!["none"]);
        assert!(result.suggestions.is_empty());

        let map = json!({"status": "maybe", "confidence": -2}).as_object().unwrap().clone();
        let result = parse_validation(map, "passport").unwrap();
        assert_eq!(result.status, ValidationStatus::NeedsReview);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn empty_text_short_circuits() {
        let scripted = Arc::new(ScriptedLlmClient::replies(&[]));
        let ai = AiService::new(Box::new(Arc::clone(&scripted)) as Box<dyn LlmClient>, 100);
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        let contexts = StaticContextSource::new();

        let result = validate(&TaskDeps::new(&ai, &rag, &contexts), &request("   "));
        assert_eq!(result.source, ResultSource::Fallback);
        assert_eq!(result.status, ValidationStatus::NeedsReview);
        assert_eq!(scripted.call_count(), 0);
    }

    #[test]
    fn generated_verdict_uses_low_temperature() {
        let scripted = Arc::new(ScriptedLlmClient::replies(&[
            r#"{"status": "rejected", "confidence": 0.9, "issues": ["Passport expired"], "suggestions": ["Renew passport"], "summary": "Expired"}"#,
        ]));
        let ai = AiService::new(Box::new(Arc::clone(&scripted)) as Box<dyn LlmClient>, 100);
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        rag.initialize();
        let contexts = StaticContextSource::new();

        let result = validate(
            &TaskDeps::new(&ai, &rag, &contexts),
            &request("PASSPORT Expiry 2019-01-01"),
        );
        assert_eq!(result.status, ValidationStatus::Rejected);
        assert_eq!(result.issues, vec!["Passport expired"]);
        assert_eq!(result.source, ResultSource::Ai);

        let params = scripted.params_for_call(0).unwrap();
        assert_eq!(params.temperature, 0.2);
        assert_eq!(params.max_tokens, Some(800));
        let user = &scripted.messages_for_call(0).unwrap()[1].content;
        assert!(user.contains("EXPECTED DOCUMENT TYPE: passport"));
        assert!(user.contains("**Source: UK**"));
    }

    #[test]
    fn failures_fall_back_to_localized_manual_review() {
        let ai = scripted_ai(vec![Ok("?".into()), Ok("?".into()), Ok("?".into())]);
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        let contexts = StaticContextSource::new();
        let deps = TaskDeps::new(&ai, &rag, &contexts).with_retry(RetryPolicy::immediate(2));

        let mut req = request("some text");
        req.language = "ru".into();
        let result = validate(&deps, &req);
        assert_eq!(result.source, ResultSource::Fallback);
        assert_eq!(result.confidence, 0.0);
        assert!(result.issues[0].starts_with("Автоматическая проверка"));
        assert!(result.error.is_some());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "needs_review");
    }
}
