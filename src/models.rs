//! Core data models that flow through the indexing and query pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A bounded segment of source text with stable identity. The unit of
/// indexing and retrieval.
///
/// The `id` is derived deterministically from `source_path` and
/// `chunk_index`, so re-chunking the same source reproduces the same ids.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub source_path: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub created_at: DateTime<Utc>,
}

/// A chunk paired with its embedding vector.
///
/// Every vector written to or read from the store during a session must
/// share one dimension; the indexer enforces this before insertion.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// One similarity-search hit, produced fresh per query and never persisted.
///
/// `score` is in the metric's range (cosine: [-1, 1]).
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalMatch {
    pub chunk_id: String,
    pub text: String,
    pub source_path: String,
    pub score: f32,
}

/// Attribution entry for a chunk that was actually packed into the
/// generation context.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceRef {
    pub source_path: String,
    pub score: f32,
}

/// Final output of a completed task: the grounded answer plus the sources
/// it drew on.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

/// Collection statistics reported by the vector store.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub collection: String,
    pub count: u64,
    pub dimension: usize,
    pub metric: String,
}
