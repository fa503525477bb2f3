//! # ragpipe
//!
//! A retrieval-augmented generation (RAG) pipeline with a task-based
//! execution surface.
//!
//! ragpipe ingests documents (txt, md, pdf, docx), chunks them with an
//! overlapping word window, embeds the chunks through an HTTP language
//! gateway, and stores the vectors in a collection-scoped vector store.
//! Queries run through a three-stage workflow — validate, retrieve,
//! generate — and are exposed both as CLI commands and as asynchronous
//! tasks over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Documents │──▶│   Indexer    │──▶│ Vector store │
//! │ txt/md/…  │   │ chunk+embed  │   │  (HTTP/mem)  │
//! └───────────┘   └──────────────┘   └──────┬───────┘
//!                                           │
//!                  ┌────────────────────────┤
//!                  ▼                        ▼
//!            ┌──────────┐            ┌────────────┐
//!            │   CLI    │            │ HTTP tasks │
//!            │  (rag)   │            │  (axum)    │
//!            └──────────┘            └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`extract`] | Document loading and text extraction |
//! | [`chunk`] | Sliding word-window chunking |
//! | [`gateway`] | Embedding/generation and vector store clients |
//! | [`index`] | Document ingestion pipeline |
//! | [`retriever`] | Query-time retrieval |
//! | [`synthesize`] | Context packing and answer generation |
//! | [`workflow`] | RAG workflow state machine |
//! | [`task`] | Task lifecycle and background execution |
//! | [`server`] | HTTP task API |
//! | [`retry`] | Bounded backoff for transient upstream failures |

pub mod chunk;
pub mod config;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod index;
pub mod models;
pub mod retriever;
pub mod retry;
pub mod server;
pub mod synthesize;
pub mod task;
pub mod workflow;
