//! Query-time retrieval: embed the query, search the vector store, filter
//! and rank.
//!
//! Ordering is deterministic for a fixed store snapshot and query vector:
//! score descending, then chunk id ascending. The store is expected to
//! return results pre-sorted by similarity, but the retriever re-sorts
//! defensively rather than assuming it.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::gateway::{LanguageGateway, VectorStore};
use crate::models::RetrievalMatch;
use crate::retry::{with_backoff, BackoffPolicy};

pub struct Retriever {
    gateway: Arc<dyn LanguageGateway>,
    store: Arc<dyn VectorStore>,
    backoff: BackoffPolicy,
}

impl Retriever {
    pub fn new(
        gateway: Arc<dyn LanguageGateway>,
        store: Arc<dyn VectorStore>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            gateway,
            store,
            backoff,
        }
    }

    /// Retrieve up to `top_k` matches scoring at least `score_threshold`.
    ///
    /// The threshold is inclusive: `score == score_threshold` passes. An
    /// empty result is a valid outcome, not an error — the synthesizer
    /// handles "no relevant context" explicitly.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<RetrievalMatch>> {
        let query_vector = with_backoff(&self.backoff, "embed query", |_| {
            self.gateway.embed(query)
        })
        .await?;

        debug!(dimension = query_vector.len(), "query embedded");

        let hits = with_backoff(&self.backoff, "vector search", |_| {
            self.store.search(&query_vector, top_k)
        })
        .await?;

        let mut matches: Vec<RetrievalMatch> = hits
            .into_iter()
            .filter(|m| m.score >= score_threshold)
            .collect();

        // Score descending; equal scores break ties by chunk id ascending
        // so ordering never depends on store return order.
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        matches.truncate(top_k);

        info!(
            count = matches.len(),
            top_k, score_threshold, "retrieval complete"
        );
        Ok(matches)
    }
}
