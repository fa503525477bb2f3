//! Sliding word-window text chunker.
//!
//! Splits whitespace-tokenized text into overlapping [`Chunk`]s of at most
//! `max_words` words, advancing `max_words - overlap_words` words per step.
//! The trailing `overlap_words` words of each chunk reappear at the head of
//! the next, so a phrase straddling a boundary stays intact in one of them.
//!
//! Each chunk gets a deterministic id derived from its source path and
//! index: re-chunking the same source with the same parameters reproduces
//! identical `(id, chunk_index)` sequences.

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::models::Chunk;

/// Split `text` into overlapping chunks.
///
/// Empty or whitespace-only input yields zero chunks (not an error). Text
/// of `max_words` words or fewer yields exactly one chunk. The last chunk
/// may be shorter than `max_words`.
///
/// Returns a `Validation` error if `overlap_words >= max_words` — the
/// window would never advance.
pub fn chunk_text(
    source_path: &str,
    text: &str,
    max_words: usize,
    overlap_words: usize,
) -> Result<Vec<Chunk>> {
    if max_words == 0 {
        return Err(RagError::Validation("max_words must be > 0".to_string()));
    }
    if overlap_words >= max_words {
        return Err(RagError::Validation(format!(
            "overlap_words ({}) must be < max_words ({})",
            overlap_words, max_words
        )));
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let stride = max_words - overlap_words;
    let created_at = Utc::now();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let end = (start + max_words).min(words.len());
        let chunk_text = words[start..end].join(" ");
        let index = chunks.len();
        chunks.push(Chunk {
            id: chunk_id(source_path, index),
            text: chunk_text,
            source_path: source_path.to_string(),
            chunk_index: index,
            total_chunks: 0, // back-filled below
            created_at,
        });
        if end == words.len() {
            break;
        }
        start += stride;
    }

    let total = chunks.len();
    for chunk in &mut chunks {
        chunk.total_chunks = total;
    }

    Ok(chunks)
}

/// Derive a stable chunk id from source path and position.
///
/// First 32 hex chars of `sha256("{source_path}:{chunk_index}")`.
pub fn chunk_id(source_path: &str, chunk_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", source_path, chunk_index).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..32].to_string()
}
