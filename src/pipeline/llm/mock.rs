use std::collections::VecDeque;
use std::sync::Mutex;

use super::types::{ChatMessage, Completion, GenerationParams, TokenUsage};
use super::{LlmClient, LlmError};

/// Mock LLM client for testing. Returns a configurable response or failure.
pub struct MockLlmClient {
    response: Result<String, String>,
    usage: TokenUsage,
    model: String,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            usage: TokenUsage::new(10, 20),
            model: "mock-model".to_string(),
        }
    }

    /// A client whose every call fails with a connection error.
    pub fn failing(reason: &str) -> Self {
        Self {
            response: Err(reason.to_string()),
            usage: TokenUsage::default(),
            model: "mock-model".to_string(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

impl LlmClient for MockLlmClient {
    fn complete(
        &self,
        _messages: &[ChatMessage],
        _params: &GenerationParams,
    ) -> Result<Completion, LlmError> {
        match &self.response {
            Ok(content) => Ok(Completion {
                content: content.clone(),
                finish_reason: "stop".to_string(),
                usage: self.usage,
            }),
            Err(reason) => Err(LlmError::Connection(reason.clone())),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &'static str {
        "mock"
    }

    fn default_max_tokens(&self) -> u32 {
        2048
    }

    fn max_output_tokens(&self) -> u32 {
        2048
    }
}

/// Mock client that replays a queue of responses in order and records
/// every message list it receives. Once the queue is drained, further
/// calls fail.
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<(Vec<ChatMessage>, GenerationParams)>>,
}

impl ScriptedLlmClient {
    pub fn new(responses: Vec<Result<String, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Convenience constructor for a script of successful replies.
    pub fn replies(responses: &[&str]) -> Self {
        Self::new(responses.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Messages sent on the n-th call.
    pub fn messages_for_call(&self, n: usize) -> Option<Vec<ChatMessage>> {
        self.calls
            .lock()
            .ok()
            .and_then(|calls| calls.get(n).map(|(m, _)| m.clone()))
    }

    pub fn params_for_call(&self, n: usize) -> Option<GenerationParams> {
        self.calls
            .lock()
            .ok()
            .and_then(|calls| calls.get(n).map(|(_, p)| *p))
    }
}

impl LlmClient for ScriptedLlmClient {
    fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<Completion, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((messages.to_vec(), *params));
        }

        let next = self
            .responses
            .lock()
            .map_err(|_| LlmError::Http("script lock poisoned".into()))?
            .pop_front();

        match next {
            Some(Ok(content)) => Ok(Completion {
                content,
                finish_reason: "stop".to_string(),
                usage: TokenUsage::new(10, 20),
            }),
            Some(Err(reason)) => Err(LlmError::Connection(reason)),
            None => Err(LlmError::Connection("script exhausted".into())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }

    fn provider(&self) -> &'static str {
        "mock"
    }

    fn default_max_tokens(&self) -> u32 {
        2048
    }

    fn max_output_tokens(&self) -> u32 {
        2048
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_client_returns_configured_response() {
        let client = MockLlmClient::new("test response");
        let result = client
            .complete(&[ChatMessage::user("q")], &GenerationParams::default())
            .unwrap();
        assert_eq!(result.content, "test response");
        assert_eq!(result.usage.total_tokens, 30);
    }

    #[test]
    fn failing_mock_returns_connection_error() {
        let client = MockLlmClient::failing("offline");
        let result = client.complete(&[], &GenerationParams::default());
        assert!(matches!(result, Err(LlmError::Connection(r)) if r == "offline"));
    }

    #[test]
    fn scripted_client_replays_in_order_and_records() {
        let client = ScriptedLlmClient::new(vec![Ok("first".into()), Err("boom".into())]);
        let params = GenerationParams::default().with_temperature(0.3);

        let first = client.complete(&[ChatMessage::user("a")], &params).unwrap();
        assert_eq!(first.content, "first");
        assert!(client.complete(&[ChatMessage::user("b")], &params).is_err());
        assert!(client.complete(&[ChatMessage::user("c")], &params).is_err());

        assert_eq!(client.call_count(), 3);
        assert_eq!(client.messages_for_call(1).unwrap()[0].content, "b");
        assert_eq!(client.params_for_call(0).unwrap().temperature, 0.3);
    }
}
