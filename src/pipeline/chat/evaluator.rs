//! Second-pass review of a drafted chat reply.

use serde::Serialize;
use serde_json::Value;

use crate::pipeline::json_repair::{extract_json_object, string_list};
use crate::pipeline::llm::{AiService, GenerateRequest, GenerationParams, TokenUsage};
use crate::pipeline::rag::RetrievedContext;

/// Replies scoring below this are regenerated.
pub const MIN_ACCEPTABLE_SCORE: f32 = 7.0;

const EVALUATOR_PROMPT: &str = "You are a strict quality reviewer for VisaBuddy, a visa application assistant. \
You review a draft answer before it is sent to the user.

Check the draft for:
1. Factual claims about visa rules that contradict the provided knowledge-base context.
2. Invented fees, processing times or document requirements not supported by the context.
3. Answering in a different language than the user's question.
4. Missing the actual question or giving vague, generic advice.
5. Missing the recommendation to verify critical details with the embassy when rules are uncertain.

Respond with JSON only:
{\"score\": 0-10, \"issues\": [\"...\"], \"needs_regeneration\": true|false}";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub score: f32,
    pub issues: Vec<String>,
    pub needs_regeneration: bool,
}

impl Evaluation {
    pub fn requires_regeneration(&self) -> bool {
        self.needs_regeneration || self.score < MIN_ACCEPTABLE_SCORE
    }
}

/// Parse the reviewer's verdict. `None` when no usable score is present.
pub fn parse_evaluation(raw: &str) -> Option<Evaluation> {
    let map = extract_json_object(raw).ok()?;
    let score = map.get("score").and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })?;
    Some(Evaluation {
        score: score.clamp(0.0, 10.0) as f32,
        issues: string_list(&map, "issues"),
        needs_regeneration: map
            .get("needs_regeneration")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

/// Ask the model to grade `draft`. Returns the verdict (if any) and the
/// tokens spent on the review.
pub fn evaluate(
    ai: &AiService,
    question: &str,
    draft: &str,
    rag: Option<&RetrievedContext>,
) -> (Option<Evaluation>, TokenUsage) {
    let context = match rag {
        Some(ctx) if !ctx.is_empty() => ctx
            .documents
            .iter()
            .map(|d| format!("[{}] {}", d.source, d.content))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => "(no knowledge-base context was retrieved)".to_string(),
    };
    let review = format!(
        "USER QUESTION:\n{question}\n\nKNOWLEDGE-BASE CONTEXT:\n{context}\n\nDRAFT ANSWER:\n{draft}"
    );

    let response = ai.generate(
        &GenerateRequest::new(&review)
            .with_system_prompt(EVALUATOR_PROMPT)
            .with_params(GenerationParams::default().with_temperature(0.0).with_max_tokens(300)),
    );
    if !response.is_generated() {
        tracing::warn!(error = ?response.error, "Self-evaluation unavailable, accepting draft");
        return (None, response.usage);
    }

    let evaluation = parse_evaluation(&response.content);
    if evaluation.is_none() {
        tracing::warn!("Unparseable self-evaluation, accepting draft");
    }
    (evaluation, response.usage)
}

/// Extra system-prompt section listing what the reviewer flagged.
pub fn revision_instructions(evaluation: &Evaluation) -> String {
    let mut section = String::from(
        "**QUALITY REVIEW**: A previous draft of your answer was rejected by review. Write a new answer that fixes these problems:",
    );
    if evaluation.issues.is_empty() {
        section.push_str("\n- The answer was too vague or unsupported by the provided context.");
    }
    for issue in &evaluation.issues {
        section.push_str("\n- ");
        section.push_str(issue);
    }
    section
}
