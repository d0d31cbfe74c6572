pub mod retry;
pub mod json_repair;
pub mod llm;
pub mod prompt;
pub mod rag;
pub mod context;
pub mod task;
pub mod checklist;
pub mod probability;
pub mod validation;
pub mod chat;
