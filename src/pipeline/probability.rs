//! Visa approval probability estimate.
//!
//! Starts from the backend's rule-based `riskScore` and lets the model
//! adjust it with retrieved policy context. Estimates never reach 0% or
//! 100%: both generated and fallback percentages are clamped to 10..=90.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pipeline::context::{AiUserContext, RiskScore};
use crate::pipeline::json_repair::{string_field, string_list};
use crate::pipeline::llm::{GenerateRequest, GenerationParams};
use crate::pipeline::prompt::{build_system_prompt, Language};
use crate::pipeline::rag::{RetrievalFilter, RetrievedContext};
use crate::pipeline::task::{policy_extracts, value_text, ResultSource, TaskDeps, TaskError};

const MIN_PERCENT: f64 = 10.0;
const MAX_PERCENT: f64 = 90.0;
const PROMPT_BASE_PERCENT: f64 = 70.0;
const FALLBACK_BASE_PERCENT: f64 = 65.0;

const RISKS_UNAVAILABLE: &str = "Unable to analyze risks at this time.";
const POSITIVES_UNAVAILABLE: &str = "Unable to analyze positive factors at this time.";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbabilityRequest {
    pub application_id: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub mock_context: Option<AiUserContext>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbabilityLevel {
    Low,
    Medium,
    High,
}

impl ProbabilityLevel {
    pub fn from_percent(percent: u8) -> Self {
        match percent {
            p if p < 40 => ProbabilityLevel::Low,
            p if p < 70 => ProbabilityLevel::Medium,
            _ => ProbabilityLevel::High,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" => Some(ProbabilityLevel::Low),
            "medium" => Some(ProbabilityLevel::Medium),
            "high" => Some(ProbabilityLevel::High),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ProbabilityLevel::Low => "low",
            ProbabilityLevel::Medium => "medium",
            ProbabilityLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probability {
    pub percent: u8,
    pub level: ProbabilityLevel,
    pub warning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbabilityResult {
    #[serde(rename = "type")]
    pub kind: String,
    pub visa_type: String,
    pub country: String,
    pub probability: Probability,
    pub main_risks: Vec<String>,
    pub positive_factors: Vec<String>,
    pub improvement_tips: Vec<String>,
    pub source: ResultSource,
}

fn clamp_percent(percent: f64) -> u8 {
    percent.round().clamp(MIN_PERCENT, MAX_PERCENT) as u8
}

// ═══════════════════════════════════════════════════════════
// Generation
// ═══════════════════════════════════════════════════════════

pub fn generate(deps: &TaskDeps<'_>, request: &ProbabilityRequest) -> ProbabilityResult {
    tracing::info!(application_id = %request.application_id, "Generating visa probability");

    // Step 1: Context
    let context = match deps.load_context(
        &request.application_id,
        request.auth_token.as_deref(),
        request.mock_context.as_ref(),
    ) {
        Ok(context) => context,
        Err(e) => {
            tracing::error!(application_id = %request.application_id, error = %e, "Probability context unavailable");
            return fallback_probability("US", "tourist", Language::En, None, Some(&e.to_string()));
        }
    };

    // Step 2: Key fields
    let country = context.country().to_string();
    let visa_type = context.visa_type().to_string();
    let language = Language::from_code(context.language());
    let risk = context.risk_score.as_ref();
    tracing::info!(%country, %visa_type, language = language.code(), has_risk_score = risk.is_some(), "Extracted probability context");

    // Step 3: Retrieval
    let query = format!("{country} {visa_type} visa approval probability factors requirements");
    let rag = deps.retrieve(
        &query,
        &RetrievalFilter::new(Some(&country), Some(&visa_type)),
        10,
    );

    // Step 4: Prompts
    let user_message = probability_prompt(&context, rag.as_ref(), language);
    let application = context.application_context();
    let profile = context.user_profile();
    let system_prompt = build_system_prompt(
        context.language(),
        rag.as_ref(),
        Some(&profile),
        Some(&application),
    );

    // Step 5: Generate and repair
    let generate_request = GenerateRequest::new(&user_message)
        .with_system_prompt(&system_prompt)
        .with_user(context.user_id())
        .with_params(GenerationParams::default().with_temperature(0.5).with_max_tokens(1200));

    match deps.generate_json(&generate_request, |map| {
        parse_probability(map, &country, &visa_type, language)
    }) {
        Ok((result, _)) => {
            tracing::info!(percent = result.probability.percent, %country, %visa_type, "Generated probability");
            result
        }
        Err(e) => {
            tracing::error!(error = %e, "Probability generation failed, using fallback");
            fallback_probability(&country, &visa_type, language, risk, Some(&e.to_string()))
        }
    }
}

fn parse_probability(
    map: Map<String, Value>,
    country: &str,
    visa_type: &str,
    language: Language,
) -> Result<ProbabilityResult, TaskError> {
    if map.get("type").and_then(Value::as_str) != Some("probability") {
        return Err(TaskError::Invalid("response type is not 'probability'".into()));
    }

    let empty = Map::new();
    let probability = map
        .get("probability")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let percent = probability.get("percent").and_then(Value::as_f64);
    let level = string_field(probability, "level").and_then(|l| ProbabilityLevel::parse(&l));
    let (percent, level) = match (percent, level) {
        (Some(p), Some(level)) => (clamp_percent(p), level),
        (Some(p), None) => {
            let percent = clamp_percent(p);
            (percent, ProbabilityLevel::from_percent(percent))
        }
        (None, Some(level)) => (clamp_percent(PROMPT_BASE_PERCENT), level),
        (None, None) => {
            let percent = clamp_percent(PROMPT_BASE_PERCENT);
            (percent, ProbabilityLevel::from_percent(percent))
        }
    };

    Ok(ProbabilityResult {
        kind: "probability".to_string(),
        visa_type: visa_type.to_string(),
        country: country.to_string(),
        probability: Probability {
            percent,
            level,
            warning: string_field(probability, "warning")
                .unwrap_or_else(|| warning(language).to_string()),
        },
        main_risks: string_list(&map, "mainRisks"),
        positive_factors: string_list(&map, "positiveFactors"),
        improvement_tips: string_list(&map, "improvementTips"),
        source: ResultSource::Ai,
    })
}

/// Estimate from the rule-based risk score alone.
pub fn fallback_probability(
    country: &str,
    visa_type: &str,
    language: Language,
    risk: Option<&RiskScore>,
    error: Option<&str>,
) -> ProbabilityResult {
    if let Some(error) = error {
        tracing::debug!(error, "Building fallback probability");
    }

    let percent = clamp_percent(
        risk.and_then(|r| r.probability_percent)
            .unwrap_or(FALLBACK_BASE_PERCENT),
    );
    let texts = |items: Option<&Vec<Value>>, empty: &str| -> Vec<String> {
        let list: Vec<String> = items
            .map(|v| v.iter().map(value_text).collect())
            .unwrap_or_default();
        if list.is_empty() {
            vec![empty.to_string()]
        } else {
            list
        }
    };

    ProbabilityResult {
        kind: "probability".to_string(),
        visa_type: visa_type.to_string(),
        country: country.to_string(),
        probability: Probability {
            percent,
            level: ProbabilityLevel::from_percent(percent),
            warning: warning(language).to_string(),
        },
        main_risks: texts(risk.map(|r| &r.risk_factors), RISKS_UNAVAILABLE),
        positive_factors: texts(risk.map(|r| &r.positive_factors), POSITIVES_UNAVAILABLE),
        improvement_tips: improvement_tips(language).iter().map(|t| t.to_string()).collect(),
        source: ResultSource::Fallback,
    }
}

// ═══════════════════════════════════════════════════════════
// Localized texts
// ═══════════════════════════════════════════════════════════

fn warning(language: Language) -> &'static str {
    match language {
        Language::Uz => "Bu faqat sizning javoblaringiz va odatiy naqshlarga asoslangan taxmin. Bu KAFOLAT EMAS. Faqat elchixona yakuniy qaror qabul qiladi.",
        Language::Ru => "Это только оценка на основе ваших ответов и типичных паттернов. Это НЕ гарантия. Только посольство может принять окончательное решение.",
        Language::En => "This is only an estimate based on your answers and typical patterns. It is NOT a guarantee. Only the embassy can make the final decision.",
    }
}

fn improvement_tips(language: Language) -> [&'static str; 3] {
    match language {
        Language::Uz => [
            "Moliyaviy holatingizni yaxshilang va bank hisobingizni ko'rsating.",
            "O'zbekistondagi aloqalaringizni (mulk, oila) hujjatlashtiring.",
            "Barcha kerakli hujjatlarni to'liq va aniq taqdim eting.",
        ],
        Language::Ru => [
            "Улучшите свое финансовое положение и покажите банковский счет.",
            "Документируйте свои связи с Узбекистаном (собственность, семья).",
            "Предоставьте все необходимые документы полностью и точно.",
        ],
        Language::En => [
            "Improve your financial situation and show bank statements.",
            "Document your ties to Uzbekistan (property, family).",
            "Provide all required documents completely and accurately.",
        ],
    }
}

fn probability_template(language: Language) -> String {
    format!(
        "```json\n{{\n  \"type\": \"probability\",\n  \"visaType\": \"...\",\n  \"country\": \"...\",\n  \"probability\": {{\n    \"percent\": 62,\n    \"level\": \"medium\",\n    \"warning\": \"{}\"\n  }},\n  \"mainRisks\": [\"...\"],\n  \"positiveFactors\": [\"...\"],\n  \"improvementTips\": [\"...\"]\n}}\n```",
        warning(language)
    )
}

fn probability_prompt(context: &AiUserContext, rag: Option<&RetrievedContext>, language: Language) -> String {
    let context_json = context.to_pretty_json();
    let extracts = policy_extracts(rag);
    let risk = context.risk_score.as_ref();
    let base_percent = risk
        .and_then(|r| r.probability_percent)
        .unwrap_or(PROMPT_BASE_PERCENT);
    let base_level = risk
        .and_then(|r| r.level.as_deref())
        .unwrap_or("medium");
    let template = probability_template(language);

    match language {
        Language::Uz => format!(
            "Siz VisaBuddy'siz. Quyidagi JSON konteksti va siyosat ma'lumotlaridan foydalanib, bu foydalanuvchi uchun viza olish ehtimolini hisoblang va tahlil qiling.\n\n\
             FOYDALANUVCHI KONTEKSTI (JSON):\n```json\n{context_json}\n```\n\n\
             RELEVANT VIZA QOIDALARI:\n{extracts}\n\n\
             VAZIFA:\n\n\
             1. **Asosiy ball**: riskScore.probabilityPercent ({base_percent}%) va riskScore.level ({base_level}) dan foydalaning.\n\
             2. **Ehtimolni hisoblang**: RAG ma'lumotlari va kontekstni hisobga olgan holda, asosiy balldan boshlab, lekin 0% yoki 100% ga bormang.\n\
             3. **Asosiy xavflar**: riskScore.riskFactors va boshqa omillarni tahlil qiling.\n\
             4. **Ijobiy omillar**: riskScore.positiveFactors va boshqa kuchli tomonlarni ro'yxatga oling.\n\
             5. **Yaxshilash maslahatlari**: Ehtimolni oshirish uchun amaliy maslahatlar bering.\n\n\
             **MUHIM**:\n\
             - Ogohlantirish matnini yoki shunga o'xshash narsani har doim qoldiring.\n\
             - Javob foydalanuvchining ilova tilida bo'lishi kerak: O'zbek tili (Lotin yozuvi).\n\
             - Chiqish JSON formatida bo'lishi kerak va quyidagi shablonga mos kelishi kerak:\n\n{template}"
        ),
        Language::Ru => format!(
            "Вы - VisaBuddy. Используйте JSON-контекст и извлечения политики ниже, чтобы рассчитать и проанализировать вероятность получения визы для этого пользователя.\n\n\
             КОНТЕКСТ ПОЛЬЗОВАТЕЛЯ (JSON):\n```json\n{context_json}\n```\n\n\
             РЕЛЕВАНТНЫЕ ВИЗОВЫЕ ПРАВИЛА:\n{extracts}\n\n\
             ЗАДАЧА:\n\n\
             1. **Базовый балл**: Используйте riskScore.probabilityPercent ({base_percent}%) и riskScore.level ({base_level}) как основу.\n\
             2. **Рассчитайте вероятность**: Начните с базового балла, учитывая информацию RAG и контекст, но НЕ переходите к 0% или 100%.\n\
             3. **Основные риски**: Проанализируйте riskScore.riskFactors и другие факторы.\n\
             4. **Положительные факторы**: Перечислите riskScore.positiveFactors и другие сильные стороны.\n\
             5. **Советы по улучшению**: Предоставьте практические советы для повышения вероятности.\n\n\
             **ВАЖНО**:\n\
             - ВСЕГДА сохраняйте текст предупреждения или что-то очень похожее.\n\
             - Ответ должен быть на языке приложения пользователя: Русский.\n\
             - Вывод ДОЛЖЕН быть в формате JSON и соответствовать шаблону:\n\n{template}"
        ),
        Language::En => format!(
            "You are VisaBuddy. Use the JSON context and policy extracts below to calculate and analyze the visa approval probability for this user.\n\n\
             USER CONTEXT (JSON):\n```json\n{context_json}\n```\n\n\
             RELEVANT VISA RULES:\n{extracts}\n\n\
             TASK:\n\n\
             1. **Base Score**: Use riskScore.probabilityPercent ({base_percent}%) and riskScore.level ({base_level}) as the base.\n\
             2. **Calculate Probability**: Start from the base score, considering RAG information and context, but do NOT go to 0% or 100%.\n\
             3. **Main Risks**: Analyze riskScore.riskFactors and other factors.\n\
             4. **Positive Factors**: List riskScore.positiveFactors and other strengths.\n\
             5. **Improvement Tips**: Provide practical tips to increase probability.\n\n\
             **IMPORTANT**:\n\
             - ALWAYS keep the warning text or something very similar.\n\
             - Response must be in the user's app language: English.\n\
             - Output MUST be in JSON format and match this template:\n\n{template}"
        ),
    }
}

impl std::fmt::Display for ProbabilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
