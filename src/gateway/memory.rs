//! In-memory [`VectorStore`] for tests and offline runs.
//!
//! Brute-force cosine similarity over `RwLock`-guarded vectors. The first
//! inserted vector pins the collection's dimension; later vectors (and
//! query vectors) of a different dimension fail with `DimensionMismatch`.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::models::{CollectionStats, RetrievalMatch};

use super::{cosine_similarity, VectorRecord, VectorStore};

pub struct InMemoryVectorStore {
    collection: String,
    records: RwLock<Vec<VectorRecord>>,
    dimension: RwLock<Option<usize>>,
}

impl InMemoryVectorStore {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            records: RwLock::new(Vec::new()),
            dimension: RwLock::new(None),
        }
    }

    fn check_dimension(&self, len: usize) -> Result<()> {
        let mut dim = self.dimension.write().unwrap();
        match *dim {
            Some(expected) if expected != len => Err(RagError::DimensionMismatch {
                expected,
                actual: len,
            }),
            Some(_) => Ok(()),
            None => {
                *dim = Some(len);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert(&self, records: &[VectorRecord]) -> Result<()> {
        for r in records {
            self.check_dimension(r.vector.len())?;
        }
        let mut stored = self.records.write().unwrap();
        for r in records {
            // Upsert by chunk id, matching re-index behavior of real stores.
            stored.retain(|existing| existing.chunk_id != r.chunk_id);
            stored.push(r.clone());
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievalMatch>> {
        self.check_dimension(vector.len())?;

        let stored = self.records.read().unwrap();
        let mut matches: Vec<RetrievalMatch> = stored
            .iter()
            .map(|r| RetrievalMatch {
                chunk_id: r.chunk_id.clone(),
                text: r.text.clone(),
                source_path: r.source_path.clone(),
                score: cosine_similarity(vector, &r.vector),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete(&self, chunk_ids: &[String]) -> Result<()> {
        let mut stored = self.records.write().unwrap();
        stored.retain(|r| !chunk_ids.contains(&r.chunk_id));
        Ok(())
    }

    async fn stats(&self) -> Result<CollectionStats> {
        let stored = self.records.read().unwrap();
        let dim = self.dimension.read().unwrap();
        Ok(CollectionStats {
            collection: self.collection.clone(),
            count: stored.len() as u64,
            dimension: dim.unwrap_or(0),
            metric: "cosine".to_string(),
        })
    }

    async fn clear(&self) -> Result<()> {
        self.records.write().unwrap().clear();
        *self.dimension.write().unwrap() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            chunk_id: id.to_string(),
            vector,
            text: format!("text for {id}"),
            source_path: "doc.txt".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_and_search_ranks_by_similarity() {
        let store = InMemoryVectorStore::new("test");
        store
            .insert(&[
                record("a", vec![1.0, 0.0]),
                record("b", vec![0.0, 1.0]),
                record("c", vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "a");
        assert_eq!(hits[1].chunk_id, "c");
    }

    #[tokio::test]
    async fn dimension_is_pinned_by_first_insert() {
        let store = InMemoryVectorStore::new("test");
        store.insert(&[record("a", vec![1.0, 0.0])]).await.unwrap();

        let err = store
            .insert(&[record("b", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 2, actual: 3 }));

        let err = store.search(&[1.0, 0.0, 0.0], 5).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn reinsert_replaces_by_chunk_id() {
        let store = InMemoryVectorStore::new("test");
        store.insert(&[record("a", vec![1.0, 0.0])]).await.unwrap();
        store.insert(&[record("a", vec![0.0, 1.0])]).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.count, 1);

        let hits = store.search(&[0.0, 1.0], 1).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let store = InMemoryVectorStore::new("test");
        store
            .insert(&[record("a", vec![1.0, 0.0]), record("b", vec![0.0, 1.0])])
            .await
            .unwrap();

        store.delete(&["a".to_string()]).await.unwrap();
        assert_eq!(store.stats().await.unwrap().count, 1);

        store.clear().await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.dimension, 0);

        // Cleared collection accepts a new dimension.
        store.insert(&[record("c", vec![1.0, 2.0, 3.0])]).await.unwrap();
        assert_eq!(store.stats().await.unwrap().dimension, 3);
    }
}
