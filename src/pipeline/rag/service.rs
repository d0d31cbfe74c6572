use std::path::PathBuf;
use std::sync::{Mutex, PoisonError, RwLock};

use serde::Serialize;
use uuid::Uuid;

use super::cache::{CacheEntry, CacheStats, LocalCache};
use super::chunker::{ChunkStrategy, DocumentChunker};
use super::embedder::{EmbeddingModel, FallbackEmbedder};
use super::index::{upsert_in_batches, RemoteIndex, VectorRecord, UPSERT_BATCH_SIZE};
use super::knowledge::KnowledgeBase;
use super::pinecone::PineconeIndex;
use super::types::{
    metadata, KbDocument, RagDocument, RetrievalFilter, RetrievalSource, RetrievedContext,
    ScoredMatch,
};
use super::RagError;
use crate::config::Settings;

#[derive(Debug, Default)]
struct RagState {
    initialized: bool,
    pinecone_available: bool,
    cache_populated: bool,
    /// Every indexed chunk; remote matches recover their text from here.
    chunks: Vec<KbDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagStatus {
    pub initialized: bool,
    pub pinecone_available: bool,
    pub cache_populated: bool,
    pub documents_indexed: usize,
    pub using_openai_embeddings: bool,
    pub cache_stats: CacheStats,
}

/// Retrieval over the visa knowledge base: remote vector index first,
/// local cache as fallback.
pub struct RagService {
    kb_path: PathBuf,
    embedder: FallbackEmbedder,
    remote: Option<Box<dyn RemoteIndex>>,
    chunker: DocumentChunker,
    cache: Mutex<LocalCache>,
    state: RwLock<RagState>,
}

impl RagService {
    pub fn new(
        kb_path: impl Into<PathBuf>,
        embedder: FallbackEmbedder,
        remote: Option<Box<dyn RemoteIndex>>,
        cache: LocalCache,
    ) -> Self {
        Self {
            kb_path: kb_path.into(),
            embedder,
            remote,
            chunker: DocumentChunker::default(),
            cache: Mutex::new(cache),
            state: RwLock::new(RagState::default()),
        }
    }

    /// Wire up embeddings, the Pinecone index and the cache from settings.
    /// Builds blocking HTTP clients, so call it outside async contexts.
    pub fn from_settings(settings: &Settings) -> Self {
        let embedder = FallbackEmbedder::from_api_key(settings.openai_api_key.as_deref());

        let remote = settings.pinecone_api_key.as_deref().and_then(|key| {
            let index = match settings.pinecone_index_host.as_deref() {
                Some(host) => PineconeIndex::new(host, key),
                None => PineconeIndex::connect(&settings.pinecone_index_name, key),
            };
            match index {
                Ok(index) => Some(Box::new(index) as Box<dyn RemoteIndex>),
                Err(e) => {
                    tracing::warn!(error = %e, "Pinecone unavailable, using cache fallback");
                    None
                }
            }
        });
        if settings.pinecone_api_key.is_none() {
            tracing::warn!("Pinecone API key not configured, using cache fallback only");
        }

        Self::new(
            settings.kb_path.clone(),
            embedder,
            remote,
            LocalCache::open(settings.cache_file.clone()),
        )
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, RagState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, RagState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LocalCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_initialized(&self) -> bool {
        self.read_state().initialized
    }

    /// Load, chunk, embed and index the knowledge base. Returns false
    /// when the knowledge base cannot be loaded.
    pub fn initialize(&self) -> bool {
        tracing::info!(kb = %self.kb_path.display(), "Initializing RAG service");

        // Step 1: load and chunk the knowledge base
        let kb = match KnowledgeBase::load(&self.kb_path) {
            Ok(kb) => kb,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load knowledge base");
                self.write_state().initialized = false;
                return false;
            }
        };
        let chunks = self
            .chunker
            .chunk_all(&kb.all_documents(), ChunkStrategy::Paragraphs);

        // Step 2: probe the remote index
        let mut pinecone_available = match &self.remote {
            Some(remote) => match remote.describe() {
                Ok(stats) => {
                    tracing::info!(vectors = stats.total_vector_count, "Connected to Pinecone index");
                    true
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Pinecone index unreachable, using cache fallback");
                    false
                }
            },
            None => false,
        };

        // Step 3: embed and index
        let mut cache_populated = self.read_state().cache_populated;
        match self.embed_chunks(&chunks) {
            Ok(entries) => {
                if pinecone_available {
                    pinecone_available = self.upsert_remote(&entries);
                }
                match self.lock_cache().add_batch(entries) {
                    Ok(()) => cache_populated = true,
                    Err(e) => tracing::error!(error = %e, "Failed to populate RAG cache"),
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to embed knowledge base"),
        }

        let mut state = self.write_state();
        state.initialized = true;
        state.pinecone_available = pinecone_available;
        state.cache_populated = cache_populated;
        state.chunks = chunks;
        tracing::info!(
            chunks = state.chunks.len(),
            pinecone = pinecone_available,
            cache = cache_populated,
            "RAG service initialized"
        );
        true
    }

    fn embed_chunks(&self, chunks: &[KbDocument]) -> Result<Vec<CacheEntry>, RagError> {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::EmbeddingCountMismatch);
        }
        Ok(chunks
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(document, embedding)| CacheEntry { document, embedding })
            .collect())
    }

    /// Returns whether the remote index is still usable.
    fn upsert_remote(&self, entries: &[CacheEntry]) -> bool {
        let Some(remote) = &self.remote else {
            return false;
        };
        let records: Vec<VectorRecord> = entries
            .iter()
            .map(|e| VectorRecord {
                id: e.document.id.clone(),
                values: e.embedding.clone(),
                metadata: e.document.metadata.clone(),
            })
            .collect();
        match upsert_in_batches(remote.as_ref(), &records, UPSERT_BATCH_SIZE) {
            Ok(written) => {
                tracing::info!(written, "Indexed vectors in Pinecone");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Pinecone upsert failed");
                false
            }
        }
    }

    pub fn retrieve_context(
        &self,
        query: &str,
        filter: &RetrievalFilter,
        top_k: usize,
    ) -> RetrievedContext {
        let (initialized, pinecone_available, cache_populated) = {
            let state = self.read_state();
            (state.initialized, state.pinecone_available, state.cache_populated)
        };
        if !initialized {
            tracing::warn!("RAG service not initialized");
            return RetrievedContext::empty(query);
        }

        let vector = match self.embedder.embed(query) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "Query embedding failed");
                return RetrievedContext::failed(query, e);
            }
        };
        let filter_meta = filter.to_metadata();

        if pinecone_available {
            if let Some(remote) = &self.remote {
                let filter_arg = (!filter_meta.is_empty()).then_some(&filter_meta);
                match remote.query(&vector, top_k, filter_arg) {
                    Ok(matches) if !matches.is_empty() => {
                        let state = self.read_state();
                        let documents = matches
                            .iter()
                            .map(|m| RagDocument::from_match(m, remote_text(&state.chunks, m)))
                            .collect();
                        return RetrievedContext::new(query, documents, RetrievalSource::Pinecone);
                    }
                    Ok(_) => tracing::debug!("Pinecone returned no matches"),
                    Err(e) => tracing::error!(error = %e, "Pinecone query failed"),
                }
            }
        }

        if cache_populated {
            let matches = self.lock_cache().search(&vector, top_k, &filter_meta);
            let documents = matches
                .into_iter()
                .map(|m| {
                    let text = m.text.clone().unwrap_or_default();
                    RagDocument::from_match(&m, text)
                })
                .collect();
            return RetrievedContext::new(query, documents, RetrievalSource::Cache);
        }

        tracing::warn!("No retrieval backend available");
        RetrievedContext::empty(query)
    }

    /// Chunk an uploaded document and add it to the cache and, when
    /// reachable, the remote index. Returns the chunk count.
    pub fn index_document(&self, text: &str, doc_type: &str) -> Result<usize, RagError> {
        let document = KbDocument::new(
            format!("upload_{}", Uuid::new_v4().simple()),
            text,
            metadata(&[("type", doc_type), ("topic", doc_type), ("source", "upload")]),
        );
        let chunks = self.chunker.chunk(&document, ChunkStrategy::Paragraphs);
        if chunks.is_empty() {
            return Ok(0);
        }

        let entries = self.embed_chunks(&chunks)?;
        if self.read_state().pinecone_available && !self.upsert_remote(&entries) {
            self.write_state().pinecone_available = false;
        }
        self.lock_cache().add_batch(entries)?;

        let mut state = self.write_state();
        state.cache_populated = true;
        state.chunks.extend(chunks.iter().cloned());
        tracing::info!(doc_type, chunks = chunks.len(), "Indexed uploaded document");
        Ok(chunks.len())
    }

    pub fn status(&self) -> RagStatus {
        let cache_stats = self.lock_cache().stats();
        let state = self.read_state();
        RagStatus {
            initialized: state.initialized,
            pinecone_available: state.pinecone_available,
            cache_populated: state.cache_populated,
            documents_indexed: state.chunks.len(),
            using_openai_embeddings: !self.embedder.is_using_local_fallback(),
            cache_stats,
        }
    }
}

fn remote_text(chunks: &[KbDocument], matched: &ScoredMatch) -> String {
    chunks
        .iter()
        .find(|c| c.id == matched.id)
        .map(|c| c.text.clone())
        .unwrap_or_else(|| format!("Document: {}", matched.id))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::rag::index::{IndexStats, InMemoryIndex};
    use crate::pipeline::rag::types::Metadata;

    pub(crate) const TEST_KB: &str = r#"{
        "countries": {
            "USA": {
                "country_code": "US",
                "description": "United States visas.",
                "visa_types": {
                    "Work": {"requirements": "Employment offer", "fee": "$205", "documents": ["Passport"]},
                    "Tourist": {"requirements": "Ties to home country", "fee": "$185"}
                }
            },
            "UK": {
                "country_code": "GB",
                "description": "United Kingdom visas.",
                "visa_types": {"Work": {"requirements": "Sponsor licence", "fee": "£719"}}
            }
        },
        "faqs": [{"question": "Can I work on a tourist visa?", "answer": "No."}]
    }"#;

    /// Initialized service backed by a temp knowledge base and cache.
    pub(crate) fn test_service(
        dir: &tempfile::TempDir,
        remote: Option<Box<dyn RemoteIndex>>,
    ) -> RagService {
        let kb_path = dir.path().join("visa_kb.json");
        std::fs::write(&kb_path, TEST_KB).unwrap();
        let cache = LocalCache::open(dir.path().join("cache").join("rag_cache.json"));
        RagService::new(kb_path, FallbackEmbedder::local(), remote, cache)
    }

    struct DownIndex;

    impl RemoteIndex for DownIndex {
        fn describe(&self) -> Result<IndexStats, RagError> {
            Err(RagError::Index("connection refused".into()))
        }
        fn upsert(&self, _records: &[VectorRecord]) -> Result<usize, RagError> {
            Err(RagError::Index("connection refused".into()))
        }
        fn query(
            &self,
            _vector: &[f32],
            _top_k: usize,
            _filter: Option<&Metadata>,
        ) -> Result<Vec<ScoredMatch>, RagError> {
            Err(RagError::Index("connection refused".into()))
        }
    }

    #[test]
    fn uninitialized_service_returns_none_source() {
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        let ctx = rag.retrieve_context("visa", &RetrievalFilter::default(), 5);
        assert_eq!(ctx.source, RetrievalSource::None);
        assert!(ctx.is_empty());
    }

    #[test]
    fn missing_knowledge_base_fails_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::open(dir.path().join("c.json"));
        let rag = RagService::new(dir.path().join("absent.json"), FallbackEmbedder::local(), None, cache);
        assert!(!rag.initialize());
        assert!(!rag.status().initialized);
    }

    #[test]
    fn initialize_populates_cache_without_remote() {
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        assert!(rag.initialize());

        let status = rag.status();
        assert!(status.initialized);
        assert!(!status.pinecone_available);
        assert!(status.cache_populated);
        assert!(!status.using_openai_embeddings);
        // 2 overviews + 3 visa types + 1 faq + 3 guides, one chunk each.
        assert_eq!(status.documents_indexed, 9);
        assert_eq!(status.cache_stats.total_documents, 9);
        assert!(status.cache_stats.cache_exists);
    }

    #[test]
    fn cache_retrieval_honours_filters() {
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        rag.initialize();

        let filter = RetrievalFilter::new(Some("UK"), Some("Work"));
        let ctx = rag.retrieve_context("work visa", &filter, 5);
        assert_eq!(ctx.source, RetrievalSource::Cache);
        assert_eq!(ctx.count, 1);
        assert_eq!(ctx.sources, vec!["UK"]);
        assert_eq!(ctx.documents[0].doc_type, "visa_info");
        assert!(ctx.documents[0].content.contains("Sponsor licence"));
    }

    #[test]
    fn identical_text_ranks_first() {
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        rag.initialize();
        let faq = "Q: Can I work on a tourist visa?\nA: No.";
        let ctx = rag.retrieve_context(faq, &RetrievalFilter::default(), 3);
        assert_eq!(ctx.documents.len(), 3);
        assert_eq!(ctx.documents[0].content, faq);
        assert!((ctx.documents[0].score - 1.0).abs() < 1e-4);
        assert_eq!(ctx.documents[0].source, "Unknown");
    }

    #[test]
    fn remote_index_is_preferred_and_text_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, Some(Box::new(InMemoryIndex::new())));
        rag.initialize();
        assert!(rag.status().pinecone_available);

        let filter = RetrievalFilter::new(Some("USA"), None);
        let ctx = rag.retrieve_context("fees", &filter, 10);
        assert_eq!(ctx.source, RetrievalSource::Pinecone);
        assert_eq!(ctx.count, 3);
        assert!(ctx.documents.iter().all(|d| d.source == "USA"));
        assert!(ctx.documents.iter().all(|d| !d.content.starts_with("Document:")));
    }

    #[test]
    fn unreachable_remote_falls_back_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, Some(Box::new(DownIndex)));
        assert!(rag.initialize());
        assert!(!rag.status().pinecone_available);
        let ctx = rag.retrieve_context("visa", &RetrievalFilter::default(), 2);
        assert_eq!(ctx.source, RetrievalSource::Cache);
        assert_eq!(ctx.count, 2);
    }

    #[test]
    fn uploaded_document_becomes_retrievable() {
        let dir = tempfile::tempdir().unwrap();
        let rag = test_service(&dir, None);
        rag.initialize();

        let text = "Bank statement for John Doe showing a balance of $12,000.";
        let chunks = rag.index_document(text, "bank_statement").unwrap();
        assert_eq!(chunks, 1);
        assert_eq!(rag.status().documents_indexed, 10);

        let ctx = rag.retrieve_context(text, &RetrievalFilter::default(), 1);
        assert_eq!(ctx.documents[0].content, text);
        assert_eq!(ctx.documents[0].doc_type, "bank_statement");
        assert_eq!(ctx.documents[0].source, "bank_statement");

        assert_eq!(rag.index_document("   ", "empty").unwrap(), 0);
    }

    #[test]
    fn remote_text_falls_back_to_id() {
        let m = ScoredMatch {
            id: "faq_9_chunk_1".into(),
            text: None,
            score: 0.1,
            metadata: Metadata::new(),
        };
        assert_eq!(remote_text(&[], &m), "Document: faq_9_chunk_1");
    }
}
