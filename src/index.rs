//! Document ingestion: load, chunk, embed, and store.
//!
//! Single-file failures during a directory walk (unreadable formats,
//! files that vanish mid-walk) are skipped with a warning so one bad
//! document never aborts a batch. Dimension mismatches and upstream
//! failures do abort: they indicate a misconfigured embedding model or a
//! down service, and continuing would only repeat the failure per file.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::error::{RagError, Result};
use crate::extract::{clean_text, is_supported, load_document};
use crate::gateway::{LanguageGateway, VectorRecord, VectorStore};
use crate::retry::{with_backoff, BackoffPolicy};

/// Outcome of a directory indexing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub chunks_indexed: usize,
}

pub struct Indexer {
    gateway: Arc<dyn LanguageGateway>,
    store: Arc<dyn VectorStore>,
    chunking: ChunkingConfig,
    expected_dimension: usize,
    backoff: BackoffPolicy,
}

impl Indexer {
    pub fn new(
        gateway: Arc<dyn LanguageGateway>,
        store: Arc<dyn VectorStore>,
        chunking: ChunkingConfig,
        expected_dimension: usize,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            gateway,
            store,
            chunking,
            expected_dimension,
            backoff,
        }
    }

    /// Index one document. Returns the number of chunks written; a document
    /// whose extracted text is empty indexes zero chunks successfully.
    pub async fn index_file(&self, path: &Path) -> Result<usize> {
        let raw = load_document(path)?;
        let text = clean_text(&raw);

        let source_path = path.display().to_string();
        let chunks = chunk_text(
            &source_path,
            &text,
            self.chunking.max_words,
            self.chunking.overlap_words,
        )?;
        if chunks.is_empty() {
            info!(path = %source_path, "document produced no chunks");
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = with_backoff(&self.backoff, "embed chunks", |_| {
            self.gateway.embed_batch(&texts)
        })
        .await?;

        for vector in &vectors {
            if vector.len() != self.expected_dimension {
                return Err(RagError::DimensionMismatch {
                    expected: self.expected_dimension,
                    actual: vector.len(),
                });
            }
        }

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorRecord {
                chunk_id: chunk.id.clone(),
                vector,
                text: chunk.text.clone(),
                source_path: chunk.source_path.clone(),
            })
            .collect();

        with_backoff(&self.backoff, "insert records", |_| {
            self.store.insert(&records)
        })
        .await?;

        info!(path = %source_path, chunks = records.len(), "document indexed");
        Ok(records.len())
    }

    /// Index every supported document under `root`.
    ///
    /// Files with unsupported extensions are ignored silently; supported
    /// files that fail to load are counted as skipped.
    pub async fn index_directory(&self, root: &Path, recursive: bool) -> Result<IndexReport> {
        if !root.is_dir() {
            return Err(RagError::Validation(format!(
                "not a directory: {}",
                root.display()
            )));
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut report = IndexReport::default();

        for entry in WalkDir::new(root).max_depth(max_depth).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    report.files_skipped += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_supported(entry.path()) {
                continue;
            }

            match self.index_file(entry.path()).await {
                Ok(count) => {
                    report.files_indexed += 1;
                    report.chunks_indexed += count;
                }
                Err(e @ (RagError::DocumentFormat { .. } | RagError::DocumentNotFound(_))) => {
                    warn!(path = %entry.path().display(), error = %e, "skipping document");
                    report.files_skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            files_indexed = report.files_indexed,
            files_skipped = report.files_skipped,
            chunks_indexed = report.chunks_indexed,
            "directory indexed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::InMemoryVectorStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct StubGateway {
        dimension: usize,
    }

    #[async_trait]
    impl LanguageGateway for StubGateway {
        async fn embed(&self, _: &str) -> Result<Vec<f32>> {
            Ok(vec![0.5; self.dimension])
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.5; self.dimension]).collect())
        }
        async fn generate(&self, _: &str, _: u32, _: f32) -> Result<String> {
            Ok(String::new())
        }
    }

    fn indexer(store: Arc<InMemoryVectorStore>, gateway_dim: usize) -> Indexer {
        Indexer::new(
            Arc::new(StubGateway {
                dimension: gateway_dim,
            }),
            store,
            ChunkingConfig {
                max_words: 20,
                overlap_words: 5,
            },
            4,
            BackoffPolicy::new(2, Duration::from_millis(1)),
        )
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ")
    }

    #[tokio::test]
    async fn indexes_single_file_into_store() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("doc.txt");
        std::fs::write(&path, words(50)).unwrap();

        let store = Arc::new(InMemoryVectorStore::new("test"));
        let count = indexer(store.clone(), 4).index_file(&path).await.unwrap();

        // 50 words, window 20, stride 15: starts at 0, 15, 30 → 3 chunks.
        assert_eq!(count, 3);
        assert_eq!(store.stats().await.unwrap().count, 3);
    }

    #[tokio::test]
    async fn empty_document_indexes_zero_chunks() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("empty.txt");
        std::fs::write(&path, "   \n\t  ").unwrap();

        let store = Arc::new(InMemoryVectorStore::new("test"));
        let count = indexer(store.clone(), 4).index_file(&path).await.unwrap();
        assert_eq!(count, 0);
        assert_eq!(store.stats().await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn missing_file_is_document_not_found() {
        let store = Arc::new(InMemoryVectorStore::new("test"));
        let err = indexer(store, 4)
            .index_file(Path::new("/nonexistent/doc.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn wrong_embedding_dimension_halts_indexing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("doc.txt");
        std::fs::write(&path, words(10)).unwrap();

        let store = Arc::new(InMemoryVectorStore::new("test"));
        // Gateway emits 7-dimensional vectors against a configured 4.
        let err = indexer(store.clone(), 7).index_file(&path).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 4,
                actual: 7
            }
        ));
        assert_eq!(store.stats().await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn directory_walk_counts_and_skips() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), words(10)).unwrap();
        std::fs::write(tmp.path().join("b.md"), words(10)).unwrap();
        // Unsupported extension: ignored, not counted as skipped.
        std::fs::write(tmp.path().join("c.csv"), "x,y\n1,2").unwrap();
        // Claims to be a docx but is not a ZIP archive: counted as skipped.
        std::fs::write(tmp.path().join("bad.docx"), "not a zip").unwrap();

        let store = Arc::new(InMemoryVectorStore::new("test"));
        let report = indexer(store, 4)
            .index_directory(tmp.path(), true)
            .await
            .unwrap();

        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.chunks_indexed, 2);
    }

    #[tokio::test]
    async fn non_recursive_walk_ignores_subdirectories() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("top.txt"), words(5)).unwrap();
        let sub = tmp.path().join("nested");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("deep.txt"), words(5)).unwrap();

        let store = Arc::new(InMemoryVectorStore::new("test"));
        let idx = indexer(store, 4);

        let shallow = idx.index_directory(tmp.path(), false).await.unwrap();
        assert_eq!(shallow.files_indexed, 1);

        let deep = idx.index_directory(tmp.path(), true).await.unwrap();
        assert_eq!(deep.files_indexed, 2);
    }

    #[tokio::test]
    async fn file_path_is_rejected_as_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("doc.txt");
        std::fs::write(&path, "text").unwrap();

        let store = Arc::new(InMemoryVectorStore::new("test"));
        let err = indexer(store, 4)
            .index_directory(&path, true)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }
}
