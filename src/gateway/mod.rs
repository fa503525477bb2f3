//! Gateway abstractions for the two external collaborators: the
//! embedding/generation service and the vector store.
//!
//! Both are injected as constructor-supplied trait objects so the pipeline
//! can run against deterministic fakes in tests. The HTTP implementations
//! live in [`http`]; an in-memory vector store for tests and offline runs
//! lives in [`memory`].

pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CollectionStats, RetrievalMatch};

/// One vector plus the chunk metadata persisted alongside it.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub source_path: String,
}

/// Text-in, vectors-or-prose-out gateway.
///
/// Implementations classify failures: timeouts, connection errors, and
/// 429/5xx map to `TransientUpstream` (retried by callers); other
/// rejections map to `FatalUpstream` (surfaced immediately).
#[async_trait]
pub trait LanguageGateway: Send + Sync {
    /// Embed a single text. The returned dimension is fixed per deployment.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, preserving input order. Used during indexing.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generate prose for a prompt.
    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String>;
}

/// Vector similarity store, scoped to one named collection per deployment.
///
/// `search` results may arrive sorted or unsorted; the retriever re-sorts
/// defensively either way.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert(&self, records: &[VectorRecord]) -> Result<()>;

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievalMatch>>;

    async fn delete(&self, chunk_ids: &[String]) -> Result<()>;

    async fn stats(&self) -> Result<CollectionStats>;

    /// Drop all data and recreate the collection.
    async fn clear(&self) -> Result<()>;
}

/// Cosine similarity between two vectors, in [-1.0, 1.0].
///
/// Returns 0.0 for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
