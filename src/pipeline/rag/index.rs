use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::cache::cosine_similarity;
use super::types::{Metadata, ScoredMatch};
use super::RagError;

/// Vectors per upsert request.
pub const UPSERT_BATCH_SIZE: usize = 100;

/// A vector as written to a remote index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    #[serde(default)]
    pub total_vector_count: u64,
    #[serde(default)]
    pub dimension: Option<usize>,
}

/// Remote vector index abstraction
pub trait RemoteIndex: Send + Sync {
    fn describe(&self) -> Result<IndexStats, RagError>;

    /// Returns the number of vectors written.
    fn upsert(&self, records: &[VectorRecord]) -> Result<usize, RagError>;

    /// Matches carry metadata but no text.
    fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<ScoredMatch>, RagError>;
}

impl<T: RemoteIndex + ?Sized> RemoteIndex for Box<T> {
    fn describe(&self) -> Result<IndexStats, RagError> {
        (**self).describe()
    }

    fn upsert(&self, records: &[VectorRecord]) -> Result<usize, RagError> {
        (**self).upsert(records)
    }

    fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<ScoredMatch>, RagError> {
        (**self).query(vector, top_k, filter)
    }
}

/// Upsert in fixed-size batches; stops at the first failing batch.
pub fn upsert_in_batches(
    index: &dyn RemoteIndex,
    records: &[VectorRecord],
    batch_size: usize,
) -> Result<usize, RagError> {
    let batch_size = batch_size.max(1);
    let total_batches = records.len().div_ceil(batch_size);
    let mut written = 0;
    for (i, batch) in records.chunks(batch_size).enumerate() {
        written += index.upsert(batch)?;
        tracing::info!(batch = i + 1, total_batches, "Upserted vector batch");
    }
    Ok(written)
}

/// In-process index with exact cosine search.
pub struct InMemoryIndex {
    records: Mutex<Vec<VectorRecord>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteIndex for InMemoryIndex {
    fn describe(&self) -> Result<IndexStats, RagError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(IndexStats {
            total_vector_count: records.len() as u64,
            dimension: records.first().map(|r| r.values.len()),
        })
    }

    fn upsert(&self, batch: &[VectorRecord]) -> Result<usize, RagError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        for record in batch {
            match records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => records.push(record.clone()),
            }
        }
        Ok(batch.len())
    }

    fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<ScoredMatch>, RagError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut matches: Vec<ScoredMatch> = records
            .iter()
            .filter(|r| {
                filter.map_or(true, |f| f.iter().all(|(k, v)| r.metadata.get(k) == Some(v)))
            })
            .map(|r| ScoredMatch {
                id: r.id.clone(),
                text: None,
                score: cosine_similarity(vector, &r.values),
                metadata: r.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rag::types::metadata;

    fn records(n: usize) -> Vec<VectorRecord> {
        (0..n)
            .map(|i| VectorRecord {
                id: format!("chunk_{i}"),
                values: vec![i as f32 + 1.0, 1.0],
                metadata: metadata(&[("country", if i % 2 == 0 { "USA" } else { "UK" })]),
            })
            .collect()
    }

    struct CountingIndex {
        inner: InMemoryIndex,
        calls: Mutex<Vec<usize>>,
    }

    impl RemoteIndex for CountingIndex {
        fn describe(&self) -> Result<IndexStats, RagError> {
            self.inner.describe()
        }
        fn upsert(&self, records: &[VectorRecord]) -> Result<usize, RagError> {
            self.calls.lock().unwrap().push(records.len());
            self.inner.upsert(records)
        }
        fn query(
            &self,
            vector: &[f32],
            top_k: usize,
            filter: Option<&Metadata>,
        ) -> Result<Vec<ScoredMatch>, RagError> {
            self.inner.query(vector, top_k, filter)
        }
    }

    #[test]
    fn batches_split_at_batch_size() {
        let index = CountingIndex {
            inner: InMemoryIndex::new(),
            calls: Mutex::new(Vec::new()),
        };
        let written = upsert_in_batches(&index, &records(250), UPSERT_BATCH_SIZE).unwrap();
        assert_eq!(written, 250);
        assert_eq!(*index.calls.lock().unwrap(), vec![100, 100, 50]);
        assert_eq!(index.describe().unwrap().total_vector_count, 250);
    }

    #[test]
    fn upsert_replaces_same_id() {
        let index = InMemoryIndex::new();
        index.upsert(&records(3)).unwrap();
        index.upsert(&records(2)).unwrap();
        assert_eq!(index.count(), 3);
    }

    #[test]
    fn query_filters_and_ranks() {
        let index = InMemoryIndex::new();
        index.upsert(&records(4)).unwrap();
        let filter = metadata(&[("country", "UK")]);
        let hits = index.query(&[1.0, 0.0], 5, Some(&filter)).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["chunk_3", "chunk_1"]);
        assert!(hits.iter().all(|h| h.text.is_none()));
    }

    #[test]
    fn empty_index_describes_zero() {
        let stats = InMemoryIndex::new().describe().unwrap();
        assert_eq!(stats.total_vector_count, 0);
        assert_eq!(stats.dimension, None);
    }
}
