//! Error taxonomy for the RAG pipeline.
//!
//! Every failure below the task executor is one of these variants. The
//! orchestrator normalizes them into the conversation state's single error
//! slot; the task executor is the only layer that turns one into a
//! caller-visible terminal state.
//!
//! Classification matters for two behaviors:
//! - [`RagError::is_transient`] — only transient upstream failures are
//!   retried by [`crate::retry::with_backoff`].
//! - [`RagError::code`] — machine-readable code used by the HTTP error body.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// Bad caller input. Fatal to the single request, never retried.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Timeout, connection failure, or 429/5xx-equivalent from an upstream
    /// service. Retried with bounded backoff before surfacing.
    #[error("transient upstream failure: {0}")]
    TransientUpstream(String),

    /// Upstream rejected the request outright (malformed payload, auth,
    /// non-retryable 4xx). Never retried.
    #[error("upstream rejected request: {0}")]
    FatalUpstream(String),

    /// Document exists but its content could not be extracted. Local to one
    /// document; batch indexing skips it.
    #[error("unreadable document {path}: {reason}")]
    DocumentFormat { path: PathBuf, reason: String },

    /// Document path does not exist. Local to one document.
    #[error("document not found: {0}")]
    DocumentNotFound(PathBuf),

    /// A vector's dimension disagrees with the collection's configured
    /// dimension. Fatal: halts indexing/query until the collection is
    /// recreated with a consistent embedding model.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Generation gateway failed after exhausting retries.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Caller asked for a task id the executor has never seen.
    #[error("no task with id {0}")]
    TaskNotFound(String),

    /// Task was cancelled by the caller before completing.
    #[error("task cancelled")]
    Cancelled,
}

impl RagError {
    /// Whether the retry wrapper should attempt this call again.
    pub fn is_transient(&self) -> bool {
        matches!(self, RagError::TransientUpstream(_))
    }

    /// Machine-readable code for the HTTP error body.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::Validation(_) => "bad_request",
            RagError::TransientUpstream(_) => "upstream_unavailable",
            RagError::FatalUpstream(_) => "upstream_rejected",
            RagError::DocumentFormat { .. } => "document_format",
            RagError::DocumentNotFound(_) => "document_not_found",
            RagError::DimensionMismatch { .. } => "dimension_mismatch",
            RagError::Generation(_) => "generation_failed",
            RagError::TaskNotFound(_) => "not_found",
            RagError::Cancelled => "cancelled",
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
