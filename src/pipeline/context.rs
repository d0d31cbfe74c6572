//! Per-application user context served by the main backend.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::pipeline::prompt::{ApplicationContext, UserProfile};

const FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Backend connection failed: {0}")]
    Connection(String),

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Backend returned an unsuccessful response")]
    Unsuccessful,

    #[error("Invalid context payload: {0}")]
    Parse(String),

    #[error("No context for application {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visa_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_language: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskScore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default)]
    pub risk_factors: Vec<Value>,
    #[serde(default)]
    pub positive_factors: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Everything the backend knows about one application. Unknown fields
/// are kept so the full payload can be shown to the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiUserContext {
    #[serde(default)]
    pub application: ApplicationInfo,
    #[serde(default)]
    pub user_profile: ProfileInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questionnaire_summary: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<RiskScore>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl AiUserContext {
    pub fn country(&self) -> &str {
        non_empty(&self.application.country).unwrap_or("US")
    }

    pub fn visa_type(&self) -> &str {
        non_empty(&self.application.visa_type).unwrap_or("tourist")
    }

    pub fn language(&self) -> &str {
        non_empty(&self.user_profile.app_language).unwrap_or("en")
    }

    pub fn user_id(&self) -> &str {
        non_empty(&self.user_profile.user_id).unwrap_or("unknown")
    }

    pub fn citizenship(&self) -> Option<&str> {
        self.questionnaire_summary
            .as_ref()
            .and_then(|q| q.get("citizenship"))
            .and_then(Value::as_str)
    }

    /// Pretty JSON for embedding in prompts.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn application_context(&self) -> ApplicationContext {
        ApplicationContext {
            country: Some(self.country().to_string()),
            country_code: Some(self.country().to_string()),
            visa_type: Some(self.visa_type().to_string()),
            status: Some(
                non_empty(&self.application.status)
                    .unwrap_or("draft")
                    .to_string(),
            ),
            user_language: Some(self.language().to_string()),
            ..Default::default()
        }
    }

    pub fn user_profile(&self) -> UserProfile {
        UserProfile {
            nationality: self.citizenship().map(str::to_string),
            target_country: Some(self.country().to_string()),
            visa_type: Some(self.visa_type().to_string()),
            ..Default::default()
        }
    }
}

/// Source of per-application context.
pub trait ContextSource: Send + Sync {
    fn fetch(&self, application_id: &str, auth_token: Option<&str>)
        -> Result<AiUserContext, ContextError>;
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
}

/// HTTP client for `GET {backend}/internal/ai-context/{id}`.
pub struct BackendContextClient {
    client: reqwest::blocking::Client,
    base_url: String,
    service_token: Option<String>,
}

impl BackendContextClient {
    pub fn new(base_url: &str, service_token: Option<String>) -> Result<Self, ContextError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| ContextError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_token,
        })
    }
}

impl ContextSource for BackendContextClient {
    fn fetch(
        &self,
        application_id: &str,
        auth_token: Option<&str>,
    ) -> Result<AiUserContext, ContextError> {
        let url = format!("{}/internal/ai-context/{application_id}", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(token) = auth_token.or(self.service_token.as_deref()) {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .map_err(|e| ContextError::Connection(e.to_string()))?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().unwrap_or_default();
            tracing::error!(application_id, status = status.as_u16(), "Failed to fetch AI user context");
            return Err(ContextError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope = response
            .json()
            .map_err(|e| ContextError::Parse(e.to_string()))?;
        let data = match envelope.data {
            Some(data) if envelope.success && !data.is_null() => data,
            _ => {
                tracing::warn!(application_id, "Backend returned unsuccessful context response");
                return Err(ContextError::Unsuccessful);
            }
        };

        let context = serde_json::from_value(data).map_err(|e| ContextError::Parse(e.to_string()))?;
        tracing::info!(application_id, "Fetched AI user context");
        Ok(context)
    }
}

/// In-memory contexts keyed by application id.
#[derive(Default)]
pub struct StaticContextSource {
    contexts: HashMap<String, AiUserContext>,
    default: Option<AiUserContext>,
    /// When set, fetches with any other token are rejected with 401.
    required_token: Option<String>,
}

impl StaticContextSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, application_id: &str, context: AiUserContext) -> Self {
        self.contexts.insert(application_id.to_string(), context);
        self
    }

    /// Serve `context` for every application id.
    pub fn any(context: AiUserContext) -> Self {
        Self {
            default: Some(context),
            ..Self::default()
        }
    }

    /// Reject fetches that do not carry `token`, like the backend does.
    pub fn require_token(mut self, token: &str) -> Self {
        self.required_token = Some(token.to_string());
        self
    }
}

impl ContextSource for StaticContextSource {
    fn fetch(&self, application_id: &str, auth_token: Option<&str>)
        -> Result<AiUserContext, ContextError> {
        if let Some(required) = &self.required_token {
            if auth_token != Some(required.as_str()) {
                return Err(ContextError::Status {
                    status: 401,
                    body: "Unauthorized".to_string(),
                });
            }
        }
        self.contexts
            .get(application_id)
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| ContextError::NotFound(application_id.to_string()))
    }
}
