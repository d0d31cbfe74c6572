//! OpenAI-compatible chat-completion wire format, shared by the OpenAI
//! and Together (DeepSeek) providers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::{ChatMessage, Completion, TokenUsage};
use super::LlmError;

#[derive(Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

/// Blocking HTTP endpoint for `POST .../v1/chat/completions`.
pub(crate) struct ChatEndpoint {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
    timeout_secs: u64,
}

impl ChatEndpoint {
    pub fn new(url: String, api_key: String, timeout_secs: u64) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        Ok(Self {
            client,
            url,
            api_key,
            timeout_secs,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn send(&self, body: &ChatCompletionRequest<'_>) -> Result<Completion, LlmError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    LlmError::Connection(self.url.clone())
                } else if e.is_timeout() {
                    LlmError::Timeout(self.timeout_secs)
                } else {
                    LlmError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        into_completion(parsed)
    }
}

fn into_completion(parsed: ChatCompletionResponse) -> Result<Completion, LlmError> {
    let usage = parsed.usage.unwrap_or_default();
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or(LlmError::EmptyChoices)?;

    let total = if usage.total_tokens == 0 {
        usage.prompt_tokens + usage.completion_tokens
    } else {
        usage.total_tokens
    };

    Ok(Completion {
        content: choice.message.content.unwrap_or_default(),
        finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        usage: TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: total,
        },
    })
}

#[cfg(test)]
pub(crate) mod test_server {
    //! Throwaway axum server that answers chat-completion requests.

    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    /// Request bodies received so far, in arrival order.
    pub type Received = Arc<Mutex<Vec<serde_json::Value>>>;

    /// Serve `status` + `body` on `/v1/chat/completions` and return the base URL.
    /// Requests without a bearer token get 401.
    pub async fn spawn(status: StatusCode, body: serde_json::Value) -> String {
        spawn_recording(status, body).await.0
    }

    /// Like `spawn`, also returning the request bodies the server receives.
    pub async fn spawn_recording(status: StatusCode, body: serde_json::Value) -> (String, Received) {
        let received: Received = Arc::default();
        let log = Arc::clone(&received);
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(req): Json<serde_json::Value>| {
                let body = body.clone();
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push(req);
                    let authorized = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .is_some_and(|v| v.starts_with("Bearer "));
                    if !authorized {
                        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({})));
                    }
                    (status, Json(body))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), received)
    }
}
