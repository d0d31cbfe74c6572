//! API endpoint handlers.
//!
//! Handlers validate input, then hand the blocking pipeline work to
//! `ApiContext::run_blocking`.

pub mod chat;
pub mod checklist;
pub mod documents;
pub mod health;
pub mod probability;
pub mod rag;
pub mod usage;
