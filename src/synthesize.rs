//! Answer synthesis: pack retrieved chunks into a bounded context window
//! and ask the generation gateway for a grounded answer.
//!
//! Context packing admits whole chunks only, in descending score order,
//! until the character budget would be exceeded. The single
//! highest-scoring chunk is always included — truncated to the budget if
//! it alone exceeds it, never omitted. With no matches at all, the
//! generation call is skipped entirely and a canned answer is returned,
//! which avoids both hallucination and a pointless upstream round trip.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{RagError, Result};
use crate::gateway::LanguageGateway;
use crate::models::{Artifact, RetrievalMatch, SourceRef};
use crate::retry::{with_backoff, BackoffPolicy};

/// Canned answer returned when retrieval produced no relevant context.
pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant information to answer your query.";

const INSTRUCTION: &str = "You are a helpful assistant. Answer the question using only the \
provided context. If the context does not contain the answer, say that the answer is not \
contained in the provided information.";

pub struct Synthesizer {
    gateway: Arc<dyn LanguageGateway>,
    backoff: BackoffPolicy,
    max_tokens: u32,
    temperature: f32,
}

impl Synthesizer {
    pub fn new(
        gateway: Arc<dyn LanguageGateway>,
        backoff: BackoffPolicy,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            gateway,
            backoff,
            max_tokens,
            temperature,
        }
    }

    /// Produce a grounded answer from `matches` (already sorted by score
    /// descending). `sources` lists only the chunks actually packed into
    /// the context, not all matches.
    pub async fn synthesize(
        &self,
        query: &str,
        matches: &[RetrievalMatch],
        max_context_chars: usize,
    ) -> Result<Artifact> {
        if matches.is_empty() {
            info!("no context retrieved, skipping generation");
            return Ok(Artifact {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        let (context, sources) = pack_context(matches, max_context_chars);
        debug!(
            packed = sources.len(),
            candidates = matches.len(),
            context_chars = context.chars().count(),
            "context assembled"
        );

        let prompt = build_prompt(query, &context);

        let answer = with_backoff(&self.backoff, "generate answer", |_| {
            self.gateway
                .generate(&prompt, self.max_tokens, self.temperature)
        })
        .await
        .map_err(|e| match e {
            RagError::TransientUpstream(msg) | RagError::FatalUpstream(msg) => {
                RagError::Generation(msg)
            }
            other => other,
        })?;

        Ok(Artifact { answer, sources })
    }
}

/// Pack whole chunk texts into a context string under `max_chars`
/// characters, returning the context and the attribution list for the
/// chunks included.
fn pack_context(matches: &[RetrievalMatch], max_chars: usize) -> (String, Vec<SourceRef>) {
    let mut context = String::new();
    let mut sources = Vec::new();
    let mut used_chars = 0usize;

    for (i, m) in matches.iter().enumerate() {
        let text_chars = m.text.chars().count();

        if i == 0 {
            // The top chunk is always represented, truncated if oversized.
            if text_chars > max_chars {
                context = m.text.chars().take(max_chars).collect();
                sources.push(SourceRef {
                    source_path: m.source_path.clone(),
                    score: m.score,
                });
                break;
            }
            context.push_str(&m.text);
            used_chars = text_chars;
        } else {
            let separator_chars = 2; // "\n\n"
            if used_chars + separator_chars + text_chars > max_chars {
                break;
            }
            context.push_str("\n\n");
            context.push_str(&m.text);
            used_chars += separator_chars + text_chars;
        }

        sources.push(SourceRef {
            source_path: m.source_path.clone(),
            score: m.score,
        });
    }

    (context, sources)
}

fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "{INSTRUCTION}\n\nContext:\n{context}\n\nQuestion: {query}\n\nAnswer:"
    )
}
