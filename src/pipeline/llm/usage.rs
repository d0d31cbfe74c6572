use std::collections::VecDeque;

use serde::Serialize;

use super::types::TokenUsage;

/// Most recent entries kept in memory.
const USAGE_LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageEntry {
    pub timestamp: String,
    pub user_id: Option<String>,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStats {
    pub total_tokens: u64,
    pub total_cost: f64,
    pub request_count: usize,
    pub average_tokens_per_request: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<&'static str>,
}

impl UsageStats {
    fn empty() -> Self {
        Self {
            total_tokens: 0,
            total_cost: 0.0,
            request_count: 0,
            average_tokens_per_request: 0.0,
            period: None,
        }
    }
}

/// In-memory token usage log since process start.
pub struct UsageLog {
    entries: VecDeque<UsageEntry>,
    capacity: usize,
}

impl UsageLog {
    pub fn new() -> Self {
        Self::with_capacity(USAGE_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    pub fn record(&mut self, user_id: Option<&str>, model: &str, usage: &TokenUsage) {
        let entry = UsageEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            user_id: user_id.map(str::to_string),
            model: model.to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            estimated_cost: usage.cost_estimate(),
        };
        tracing::info!(
            user_id = user_id.unwrap_or("anonymous"),
            model,
            total_tokens = usage.total_tokens,
            estimated_cost = entry.estimated_cost,
            "Token usage recorded"
        );

        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Aggregate usage, optionally restricted to one user.
    pub fn stats(&self, user_id: Option<&str>) -> UsageStats {
        let entries: Vec<&UsageEntry> = self
            .entries
            .iter()
            .filter(|e| user_id.map_or(true, |u| e.user_id.as_deref() == Some(u)))
            .collect();

        if entries.is_empty() {
            return UsageStats::empty();
        }

        let total_tokens: u64 = entries.iter().map(|e| e.total_tokens as u64).sum();
        let total_cost: f64 = entries.iter().map(|e| e.estimated_cost).sum();
        let average = total_tokens as f64 / entries.len() as f64;

        UsageStats {
            total_tokens,
            total_cost: (total_cost * 10_000.0).round() / 10_000.0,
            request_count: entries.len(),
            average_tokens_per_request: average.round(),
            period: Some("since_startup"),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        tracing::info!("Token usage log cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for UsageLog {
    fn default() -> Self {
        Self::new()
    }
}
