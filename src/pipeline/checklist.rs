//! Personalized document checklist generation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pipeline::context::AiUserContext;
use crate::pipeline::json_repair::{parse_array_lenient, string_field, string_list};
use crate::pipeline::llm::{GenerateRequest, GenerationParams};
use crate::pipeline::prompt::{build_system_prompt, Language};
use crate::pipeline::rag::{RetrievalFilter, RetrievedContext};
use crate::pipeline::task::{policy_extracts, ResultSource, TaskDeps, TaskError};

const DEFAULT_USER_INPUT: &str = "Generate my document checklist.";
const BASIC_CHECKLIST_NOTE: &str =
    "This is a basic checklist. Please verify specific requirements with the embassy.";
const AI_UNAVAILABLE_NOTE: &str = "AI generation unavailable, showing common requirements.";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChecklistRequest {
    #[serde(default)]
    pub user_input: String,
    pub application_id: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Bypasses the backend fetch.
    #[serde(default)]
    pub mock_context: Option<AiUserContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "required_kind")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub country_specific: bool,
}

fn required_kind() -> String {
    "required".to_string()
}

impl ChecklistItem {
    fn common(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: required_kind(),
            name: name.to_string(),
            description: description.to_string(),
            country_specific: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistResult {
    #[serde(rename = "type")]
    pub kind: String,
    pub visa_type: String,
    pub country: String,
    pub checklist: Vec<ChecklistItem>,
    pub notes: Vec<String>,
    pub source: ResultSource,
}

// ═══════════════════════════════════════════════════════════
// Generation
// ═══════════════════════════════════════════════════════════

pub fn generate(deps: &TaskDeps<'_>, request: &ChecklistRequest) -> ChecklistResult {
    tracing::info!(application_id = %request.application_id, "Generating document checklist");

    // Step 1: Context
    let context = match deps.load_context(
        &request.application_id,
        request.auth_token.as_deref(),
        request.mock_context.as_ref(),
    ) {
        Ok(context) => context,
        Err(e) => {
            tracing::error!(application_id = %request.application_id, error = %e, "Checklist context unavailable");
            return fallback_checklist("US", "tourist", Some(&e.to_string()));
        }
    };

    // Step 2: Key fields
    let country = context.country().to_string();
    let visa_type = context.visa_type().to_string();
    let language = context.language().to_string();
    tracing::info!(%country, %visa_type, %language, "Extracted checklist context");

    // Step 3: Retrieval
    let query = format!("{country} {visa_type} visa document requirements checklist");
    let rag = deps.retrieve(
        &query,
        &RetrievalFilter::new(Some(&country), Some(&visa_type)),
        10,
    );

    // Step 4: User prompt
    let user_input = if request.user_input.trim().is_empty() {
        DEFAULT_USER_INPUT
    } else {
        request.user_input.as_str()
    };
    let user_message = checklist_prompt(user_input, &context, rag.as_ref(), Language::from_code(&language));

    // Step 5: System prompt
    let application = context.application_context();
    let profile = context.user_profile();
    let mut system_prompt = build_system_prompt(&language, rag.as_ref(), Some(&profile), Some(&application));
    system_prompt.push_str("\n\n");
    system_prompt.push_str(checklist_instructions(Language::from_code(&language)));

    // Step 6: Generate and repair
    let generate_request = GenerateRequest::new(&user_message)
        .with_system_prompt(&system_prompt)
        .with_user(context.user_id())
        .with_params(GenerationParams::default().with_temperature(0.3).with_max_tokens(2000));

    match deps.generate_json(&generate_request, |map| parse_checklist(map, &country, &visa_type)) {
        Ok((result, _)) => {
            tracing::info!(items = result.checklist.len(), "Generated checklist");
            result
        }
        Err(e) => {
            tracing::error!(error = %e, "Checklist generation failed, using fallback");
            fallback_checklist(&country, &visa_type, Some(&e.to_string()))
        }
    }
}

fn parse_checklist(
    map: Map<String, Value>,
    country: &str,
    visa_type: &str,
) -> Result<ChecklistResult, TaskError> {
    let mut checklist: Vec<ChecklistItem> = parse_array_lenient(map.get("checklist"));
    for item in &mut checklist {
        if item.id.trim().is_empty() {
            item.id = item.name.trim().to_lowercase().replace(' ', "_");
        }
    }

    Ok(ChecklistResult {
        kind: string_field(&map, "type").unwrap_or_else(|| "checklist".to_string()),
        visa_type: string_field(&map, "visaType").unwrap_or_else(|| visa_type.to_string()),
        country: string_field(&map, "country").unwrap_or_else(|| country.to_string()),
        checklist,
        notes: string_list(&map, "notes"),
        source: ResultSource::Ai,
    })
}

/// Common requirements shown when the model cannot produce a checklist.
pub fn fallback_checklist(country: &str, visa_type: &str, error: Option<&str>) -> ChecklistResult {
    let mut checklist = vec![
        ChecklistItem::common(
            "passport",
            "Valid Passport",
            "Passport valid for at least 6 months beyond intended stay",
        ),
        ChecklistItem::common(
            "application_form",
            "Visa Application Form",
            "Completed and signed visa application form",
        ),
        ChecklistItem::common("photo", "Passport Photo", "Recent passport-sized photograph"),
        ChecklistItem::common(
            "financial_proof",
            "Financial Proof",
            "Bank statements or proof of sufficient funds",
        ),
    ];
    if visa_type == "student" {
        checklist.push(ChecklistItem::common(
            "acceptance_letter",
            "Acceptance Letter",
            "Letter of acceptance from educational institution",
        ));
    }

    ChecklistResult {
        kind: "checklist".to_string(),
        visa_type: visa_type.to_string(),
        country: country.to_string(),
        checklist,
        notes: vec![
            BASIC_CHECKLIST_NOTE.to_string(),
            error.unwrap_or(AI_UNAVAILABLE_NOTE).to_string(),
        ],
        source: ResultSource::Fallback,
    }
}

// ═══════════════════════════════════════════════════════════
// Prompts
// ═══════════════════════════════════════════════════════════

const CHECKLIST_TEMPLATE: &str = r#"```json
{
  "type": "checklist",
  "visaType": "...",
  "country": "...",
  "checklist": [...],
  "notes": [...]
}
```"#;

fn checklist_prompt(
    user_input: &str,
    context: &AiUserContext,
    rag: Option<&RetrievedContext>,
    language: Language,
) -> String {
    let context_json = context.to_pretty_json();
    let extracts = policy_extracts(rag);

    match language {
        Language::Uz => format!(
            "Siz VisaBuddy'siz. Quyidagi JSON konteksti va siyosat ma'lumotlaridan foydalanib, bu foydalanuvchi uchun TO'LIQ, aniq hujjatlar ro'yxatini yarating.\n\n\
             FOYDALANUVCHI KONTEKSTI (JSON):\n```json\n{context_json}\n```\n\n\
             RELEVANT VIZA QOIDALARI:\n{extracts}\n\n\
             VAZIFA:\n\n\
             Yosh, fuqarolik, viza turi, maqsad mamlakat, taklifnoma, moliyaviy holat, O'zbekistonga bog'liqlik, sayohat tarixi va hozirgi hujjatlar asosida shaxsiylashtirilgan ro'yxat yarating.\n\n\
             Quyidagilarni kiriting:\n- Talab qilinadigan hujjatlar\n- Tavsiya etiladigan hujjatlar\n- Mamlakatga xos hujjatlar\n\n\
             Javob foydalanuvchining ilova tilida bo'lishi kerak: O'zbek tili (Lotin yozuvi).\n\n\
             Chiqish JSON formatida bo'lishi kerak va quyidagi shablonga mos kelishi kerak:\n{CHECKLIST_TEMPLATE}\n\n\
             FOYDALANUVCHI SAVOLI:\n{user_input}"
        ),
        Language::Ru => format!(
            "Вы - VisaBuddy. Используйте JSON-контекст и извлечения политики ниже, чтобы создать ПОЛНЫЙ, точный список документов для этого пользователя.\n\n\
             КОНТЕКСТ ПОЛЬЗОВАТЕЛЯ (JSON):\n```json\n{context_json}\n```\n\n\
             РЕЛЕВАНТНЫЕ ВИЗОВЫЕ ПРАВИЛА:\n{extracts}\n\n\
             ЗАДАЧА:\n\n\
             Используйте возраст, гражданство, тип визы, страну назначения, приглашение, финансы, связи с Узбекистаном, историю путешествий и текущие документы для создания персонализированного списка.\n\n\
             Включите:\n- Обязательные документы\n- Рекомендуемые документы\n- Документы, специфичные для страны\n\n\
             Ответ должен быть на языке приложения пользователя: Русский.\n\n\
             Вывод ДОЛЖЕН быть в формате JSON и соответствовать шаблону \"checklist\":\n{CHECKLIST_TEMPLATE}\n\n\
             ВОПРОС ПОЛЬЗОВАТЕЛЯ:\n{user_input}"
        ),
        Language::En => format!(
            "You are VisaBuddy. Use the JSON context and the policy extracts below to create a FULL, precise document checklist for this user.\n\n\
             USER CONTEXT (JSON):\n```json\n{context_json}\n```\n\n\
             RELEVANT VISA RULES:\n{extracts}\n\n\
             TASK:\n\n\
             Use age, citizenship, visaType, targetCountry, invitation, finances, ties to Uzbekistan, travel history, and current documents to generate a personalized checklist.\n\n\
             Include:\n- Required documents\n- Recommended documents\n- Country-specific documents\n\n\
             Respond in the user's app language: English.\n\n\
             The output MUST be in JSON format and match the checklist template:\n{CHECKLIST_TEMPLATE}\n\n\
             USER QUESTION:\n{user_input}"
        ),
    }
}

fn checklist_instructions(language: Language) -> &'static str {
    match language {
        Language::Uz => "**Hujjatlar ro'yxatini yaratish bo'yicha ko'rsatmalar:**\n\n\
1. Har bir hujjat uchun quyidagi maydonlarni kiriting:\n   \
- \"id\": noyob identifikator\n   \
- \"type\": \"required\" yoki \"recommended\"\n   \
- \"name\": hujjat nomi (foydalanuvchi tilida)\n   \
- \"description\": batafsil tavsif\n   \
- \"countrySpecific\": agar mamlakatga xos bo'lsa true\n\n\
2. \"notes\" maydonida umumiy tavsiyalar va muhim eslatmalarni kiriting.\n\n\
3. JSON formatida javob bering - faqat JSON, boshqa matn yo'q.",
        Language::Ru => "**Инструкции по созданию списка документов:**\n\n\
1. Для каждого документа укажите следующие поля:\n   \
- \"id\": уникальный идентификатор\n   \
- \"type\": \"required\" или \"recommended\"\n   \
- \"name\": название документа (на языке пользователя)\n   \
- \"description\": подробное описание\n   \
- \"countrySpecific\": true, если специфично для страны\n\n\
2. В поле \"notes\" укажите общие рекомендации и важные примечания.\n\n\
3. Ответьте в формате JSON - только JSON, без дополнительного текста.",
        Language::En => "**Instructions for creating document checklist:**\n\n\
1. For each document, include the following fields:\n   \
- \"id\": unique identifier\n   \
- \"type\": \"required\" or \"recommended\"\n   \
- \"name\": document name (in user's language)\n   \
- \"description\": detailed description\n   \
- \"countrySpecific\": true if country-specific\n\n\
2. In the \"notes\" field, include general recommendations and important notes.\n\n\
3. Respond in JSON format - JSON only, no additional text.",
    }
}
