use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::RagError;

/// Dimension of `text-embedding-3-small` and of the local hash vectors.
pub const EMBEDDING_DIM: usize = 1536;
pub const OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const REMOTE_BATCH_SIZE: usize = 10;

/// Embedding model abstraction
pub trait EmbeddingModel: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize;
}

impl<T: EmbeddingModel + ?Sized> EmbeddingModel for Box<T> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        (**self).embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }
}

// ═══════════════════════════════════════════════════════════
// Local hash embedder
// ═══════════════════════════════════════════════════════════

/// Deterministic embedding from a SHA-256 digest of the normalized text.
/// Only identical texts (modulo case and outer whitespace) are similar.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashEmbedder;

impl HashEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.trim().to_lowercase().as_bytes());
        let len = digest.len();

        let mut vec: Vec<f32> = (0..EMBEDDING_DIM)
            .map(|i| {
                let a = digest[(i * 2) % len] as f32;
                let b = digest[(i * 2 + 1) % len] as f32;
                ((a + b) / 255.0 - 0.5) * 2.0
            })
            .collect();

        // L2 normalize
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut vec {
                *val /= norm;
            }
        }
        vec
    }
}

impl EmbeddingModel for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(Self::vector(text))
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}

// ═══════════════════════════════════════════════════════════
// OpenAI embeddings API
// ═══════════════════════════════════════════════════════════

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: &str) -> Result<Self, RagError> {
        Self::with_url(OPENAI_EMBEDDINGS_URL, api_key)
    }

    pub fn with_url(url: &str, api_key: &str) -> Result<Self, RagError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagError::Embedding(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        let body = EmbeddingRequest {
            model: OPENAI_EMBEDDING_MODEL,
            input: texts.iter().map(|t| t.replace('\n', " ")).collect(),
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(RagError::Embedding(format!("HTTP {status}: {text}")));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| RagError::Embedding(format!("Invalid response: {e}")))?;
        if parsed.data.len() != texts.len() {
            return Err(RagError::EmbeddingCountMismatch);
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

impl EmbeddingModel for OpenAiEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.request(&[text])?
            .pop()
            .ok_or(RagError::EmbeddingCountMismatch)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(REMOTE_BATCH_SIZE) {
            out.extend(self.request(batch)?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}

// ═══════════════════════════════════════════════════════════
// Remote with local fallback
// ═══════════════════════════════════════════════════════════

/// Uses the remote embedder when one is configured and degrades to
/// [`HashEmbedder`] when it is absent or a call fails.
pub struct FallbackEmbedder {
    remote: Option<Box<dyn EmbeddingModel>>,
}

impl FallbackEmbedder {
    pub fn new(remote: Option<Box<dyn EmbeddingModel>>) -> Self {
        if remote.is_none() {
            tracing::warn!("No embedding API configured, using local hash embeddings");
        }
        Self { remote }
    }

    pub fn local() -> Self {
        Self { remote: None }
    }

    /// OpenAI embeddings when a key is present.
    pub fn from_api_key(api_key: Option<&str>) -> Self {
        let remote = api_key.and_then(|key| match OpenAiEmbedder::new(key) {
            Ok(e) => Some(Box::new(e) as Box<dyn EmbeddingModel>),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build embedding client");
                None
            }
        });
        Self::new(remote)
    }

    pub fn is_using_local_fallback(&self) -> bool {
        self.remote.is_none()
    }
}

impl EmbeddingModel for FallbackEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        if let Some(remote) = &self.remote {
            match remote.embed(text) {
                Ok(v) => return Ok(v),
                Err(e) => tracing::error!(error = %e, "Embedding failed, using local fallback"),
            }
        }
        HashEmbedder.embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        if let Some(remote) = &self.remote {
            match remote.embed_batch(texts) {
                Ok(v) => return Ok(v),
                Err(e) => tracing::error!(error = %e, "Batch embedding failed, using local fallback"),
            }
        }
        HashEmbedder.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingEmbedder;

    impl EmbeddingModel for FailingEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, RagError> {
            Err(RagError::Embedding("offline".into()))
        }

        fn dimension(&self) -> usize {
            EMBEDDING_DIM
        }
    }

    #[test]
    fn hash_vector_is_normalized_and_sized() {
        let v = HashEmbedder.embed("US tourist visa").unwrap();
        assert_eq!(v.len(), EMBEDDING_DIM);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3, "norm = {norm}");
    }

    #[test]
    fn hash_vector_ignores_case_and_outer_whitespace() {
        assert_eq!(HashEmbedder::vector("  Visa Fee "), HashEmbedder::vector("visa fee"));
        assert_ne!(HashEmbedder::vector("visa fee"), HashEmbedder::vector("visa fees"));
    }

    #[test]
    fn hash_values_follow_digest_pairs() {
        let digest = Sha256::digest(b"abc");
        let raw = ((digest[0] as f32 + digest[1] as f32) / 255.0 - 0.5) * 2.0;
        let raw_all: Vec<f32> = (0..EMBEDDING_DIM)
            .map(|i| ((digest[(i * 2) % 32] as f32 + digest[(i * 2 + 1) % 32] as f32) / 255.0 - 0.5) * 2.0)
            .collect();
        let norm: f32 = raw_all.iter().map(|x| x * x).sum::<f32>().sqrt();
        let v = HashEmbedder::vector("ABC");
        assert!((v[0] - raw / norm).abs() < 1e-6);
    }

    #[test]
    fn fallback_degrades_on_error() {
        let embedder = FallbackEmbedder::new(Some(Box::new(FailingEmbedder)));
        assert!(!embedder.is_using_local_fallback());
        let v = embedder.embed("passport").unwrap();
        assert_eq!(v, HashEmbedder::vector("passport"));
        let batch = embedder.embed_batch(&["a", "b"]).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn local_fallback_reported() {
        assert!(FallbackEmbedder::local().is_using_local_fallback());
        assert!(FallbackEmbedder::from_api_key(None).is_using_local_fallback());
    }

    #[tokio::test]
    async fn openai_embedder_batches_and_orders() {
        use axum::{routing::post, Json, Router};

        let app = Router::new().route(
            "/v1/embeddings",
            post(|Json(body): Json<serde_json::Value>| async move {
                let n = body["input"].as_array().map(|a| a.len()).unwrap_or(0);
                assert!(n <= REMOTE_BATCH_SIZE);
                assert!(!body["input"][0].as_str().unwrap_or("").contains('\n'));
                // Reversed order; the client must sort by index.
                let data: Vec<serde_json::Value> = (0..n)
                    .rev()
                    .map(|i| serde_json::json!({"index": i, "embedding": [i as f32, 1.0]}))
                    .collect();
                Json(serde_json::json!({ "data": data }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let url = format!("http://{addr}/v1/embeddings");
        let vectors = tokio::task::spawn_blocking(move || {
            let embedder = OpenAiEmbedder::with_url(&url, "sk-test").unwrap();
            let texts: Vec<String> = (0..12).map(|i| format!("line\n{i}")).collect();
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            embedder.embed_batch(&refs).unwrap()
        })
        .await
        .unwrap();

        assert_eq!(vectors.len(), 12);
        assert_eq!(vectors[0][0], 0.0);
        assert_eq!(vectors[9][0], 9.0);
        // Second batch restarts its indices.
        assert_eq!(vectors[10][0], 0.0);
    }
}
