use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{KbDocument, Metadata, ScoredMatch};
use super::RagError;

/// A chunk together with its embedding, ready for the cache.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub document: KbDocument,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    documents: Vec<KbDocument>,
    #[serde(default)]
    embeddings: HashMap<String, Vec<f32>>,
    #[serde(default)]
    metadata_index: HashMap<String, Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cached_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_documents: usize,
    pub total_embeddings: usize,
    pub cache_file: String,
    pub cache_exists: bool,
}

/// File-backed vector store used when the remote index is unavailable.
pub struct LocalCache {
    path: PathBuf,
    data: CacheFile,
}

impl LocalCache {
    /// Load the cache at `path`. A missing or unreadable file yields an
    /// empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<CacheFile>(&raw) {
                Ok(data) => {
                    tracing::info!(documents = data.documents.len(), "Loaded RAG cache");
                    data
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to load RAG cache");
                    CacheFile::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheFile::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read RAG cache");
                CacheFile::default()
            }
        };
        Self { path, data }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.data.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.documents.is_empty()
    }

    /// Insert or replace a document. Not persisted until [`save`](Self::save).
    pub fn add_document(&mut self, document: KbDocument, embedding: Vec<f32>) {
        self.data.embeddings.insert(document.id.clone(), embedding);
        self.data
            .metadata_index
            .insert(document.id.clone(), document.metadata.clone());
        match self.data.documents.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => *existing = document,
            None => self.data.documents.push(document),
        }
    }

    /// Insert a batch and persist.
    pub fn add_batch(&mut self, entries: Vec<CacheEntry>) -> Result<(), RagError> {
        let count = entries.len();
        for entry in entries {
            self.add_document(entry.document, entry.embedding);
        }
        self.save()?;
        tracing::info!(count, "Added documents to RAG cache");
        Ok(())
    }

    pub fn save(&mut self) -> Result<(), RagError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.data.cached_at = Some(chrono::Utc::now().to_rfc3339());
        let json = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Cosine-similarity search over documents whose metadata matches
    /// every filter key exactly. Results are sorted by descending score.
    pub fn search(&self, query: &[f32], top_k: usize, filter: &Metadata) -> Vec<ScoredMatch> {
        let mut scored: Vec<ScoredMatch> = self
            .data
            .documents
            .iter()
            .filter(|doc| matches_filter(self.data.metadata_index.get(&doc.id), filter))
            .filter_map(|doc| {
                let embedding = self.data.embeddings.get(&doc.id)?;
                Some(ScoredMatch {
                    id: doc.id.clone(),
                    text: Some(doc.text.clone()),
                    score: cosine_similarity(query, embedding),
                    metadata: doc.metadata.clone(),
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        tracing::debug!(results = scored.len(), "Cache search");
        scored
    }

    pub fn text_of(&self, id: &str) -> Option<&str> {
        self.data
            .documents
            .iter()
            .find(|d| d.id == id)
            .map(|d| d.text.as_str())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_documents: self.data.documents.len(),
            total_embeddings: self.data.embeddings.len(),
            cache_file: self.path.display().to_string(),
            cache_exists: self.path.exists(),
        }
    }

    /// Drop all entries and delete the backing file.
    pub fn clear(&mut self) -> Result<(), RagError> {
        self.data = CacheFile::default();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!("RAG cache cleared");
        Ok(())
    }
}

fn matches_filter(meta: Option<&Metadata>, filter: &Metadata) -> bool {
    filter.iter().all(|(key, expected)| {
        meta.and_then(|m| m.get(key)).unwrap_or(&Value::Null) == expected
    })
}

/// Cosine similarity; 0 for empty or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
