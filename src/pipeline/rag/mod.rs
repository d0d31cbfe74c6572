pub mod types;
pub mod chunker;
pub mod embedder;
pub mod knowledge;
pub mod cache;
pub mod index;
pub mod pinecone;
pub mod service;
pub mod validator;

pub use service::{RagService, RagStatus};
pub use types::{RagDocument, RetrievalFilter, RetrievalSource, RetrievedContext};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Knowledge base not found: {0}")]
    KnowledgeBaseNotFound(PathBuf),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Vector index error: {0}")]
    Index(String),

    #[error("Chunk count does not match embedding count")]
    EmbeddingCountMismatch,

    #[error("RAG service not initialized")]
    NotInitialized,
}
