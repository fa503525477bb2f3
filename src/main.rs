//! # ragpipe CLI (`rag`)
//!
//! The `rag` binary is the operator interface to the RAG pipeline. It
//! provides commands for indexing documents, asking questions, inspecting
//! the vector store, and starting the HTTP task server.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag index <path>` | Index a document or directory into the vector store |
//! | `rag query "<question>"` | Run the full retrieve-and-generate workflow |
//! | `rag search "<query>"` | Retrieval only — show matching chunks and scores |
//! | `rag stats` | Show collection statistics |
//! | `rag clear` | Drop all indexed data |
//! | `rag serve` | Start the HTTP task server |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use ragpipe::config::{self, Config};
use ragpipe::gateway::http::{HttpLanguageGateway, HttpVectorStore};
use ragpipe::gateway::{LanguageGateway, VectorStore};
use ragpipe::index::Indexer;
use ragpipe::retriever::Retriever;
use ragpipe::retry::BackoffPolicy;
use ragpipe::server::{self, AppState};
use ragpipe::synthesize::Synthesizer;
use ragpipe::task::TaskExecutor;
use ragpipe::workflow::{Orchestrator, OrchestratorSettings};

/// ragpipe CLI — a retrieval-augmented generation pipeline over your own
/// documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "ragpipe — a retrieval-augmented generation pipeline with a task-based HTTP surface",
    version,
    long_about = "ragpipe ingests documents (txt, md, pdf, docx), chunks and embeds them into a \
    vector store, and answers questions grounded in the retrieved context. Queries run through a \
    validate → retrieve → generate workflow, exposed via CLI commands and an asynchronous HTTP \
    task API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rag.toml`. Gateway, store, chunking,
    /// retrieval, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Index a document or directory.
    ///
    /// Loads each supported file (txt, md, pdf, docx), chunks it into
    /// overlapping word windows, embeds the chunks, and writes them to the
    /// vector store. Re-indexing the same file replaces its chunks.
    Index {
        /// File or directory to index.
        path: PathBuf,

        /// Do not descend into subdirectories.
        #[arg(long)]
        no_recursive: bool,
    },

    /// Ask a question against the indexed documents.
    ///
    /// Runs the full workflow: embeds the question, retrieves the most
    /// relevant chunks, and generates a grounded answer with source
    /// attribution.
    Query {
        /// The question to answer.
        query: String,

        /// Maximum number of chunks to retrieve.
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum similarity score for a chunk to be considered relevant.
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Retrieval only — show matching chunks without generating an answer.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of chunks to return.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Show collection statistics (chunk count, dimension, metric).
    Stats,

    /// Delete all indexed data from the collection.
    Clear,

    /// Start the HTTP task server.
    ///
    /// Exposes task submission (`POST /tasks`), polling
    /// (`GET /tasks/{id}`), cancellation, health, and stats endpoints.
    Serve,
}

fn backoff_from(config: &Config) -> BackoffPolicy {
    BackoffPolicy::new(
        config.gateway.max_attempts,
        Duration::from_millis(config.gateway.retry_base_ms),
    )
}

fn build_orchestrator(
    config: &Config,
    gateway: Arc<dyn LanguageGateway>,
    store: Arc<dyn VectorStore>,
    top_k: Option<usize>,
    threshold: Option<f32>,
) -> Orchestrator {
    let backoff = backoff_from(config);
    Orchestrator::new(
        Retriever::new(gateway.clone(), store, backoff),
        Synthesizer::new(
            gateway,
            backoff,
            config.synthesis.max_tokens,
            config.synthesis.temperature,
        ),
        OrchestratorSettings {
            top_k: top_k.unwrap_or(config.retrieval.top_k),
            score_threshold: threshold.unwrap_or(config.retrieval.score_threshold),
            max_context_chars: config.synthesis.max_context_chars,
            max_query_chars: config.limits.max_query_chars,
        },
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ragpipe=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let gateway: Arc<dyn LanguageGateway> = Arc::new(HttpLanguageGateway::from_config(&cfg.gateway)?);
    let store: Arc<dyn VectorStore> = Arc::new(HttpVectorStore::from_config(&cfg.store)?);

    match cli.command {
        Commands::Index { path, no_recursive } => {
            let indexer = Indexer::new(
                gateway,
                store,
                cfg.chunking.clone(),
                cfg.store.dimension,
                backoff_from(&cfg),
            );

            if path.is_file() {
                let chunks = indexer.index_file(&path).await?;
                println!("Indexed {} ({} chunks).", path.display(), chunks);
            } else {
                let report = indexer.index_directory(&path, !no_recursive).await?;
                println!(
                    "Indexed {} files ({} chunks), skipped {}.",
                    report.files_indexed, report.chunks_indexed, report.files_skipped
                );
            }
        }

        Commands::Query {
            query,
            top_k,
            threshold,
        } => {
            let orchestrator = build_orchestrator(&cfg, gateway, store, top_k, threshold);
            let state = orchestrator.run(&query, vec![]).await;

            match (state.answer, state.error) {
                (Some(answer), _) => {
                    println!("{answer}");
                    if !state.sources.is_empty() {
                        println!("\nSources:");
                        for source in &state.sources {
                            println!("  {} (score {:.3})", source.source_path, source.score);
                        }
                    }
                }
                (None, Some(error)) => {
                    anyhow::bail!("query failed: {error}");
                }
                (None, None) => {
                    anyhow::bail!("query produced neither an answer nor an error");
                }
            }
        }

        Commands::Search { query, top_k } => {
            let retriever = Retriever::new(gateway, store, backoff_from(&cfg));
            let matches = retriever
                .retrieve(
                    &query,
                    top_k.unwrap_or(cfg.retrieval.top_k),
                    cfg.retrieval.score_threshold,
                )
                .await?;

            if matches.is_empty() {
                println!("No matches above the score threshold.");
            }
            for (i, m) in matches.iter().enumerate() {
                println!("{}. [{:.3}] {} ({})", i + 1, m.score, m.source_path, m.chunk_id);
                let preview: String = m.text.chars().take(160).collect();
                println!("   {preview}");
            }
        }

        Commands::Stats => {
            let stats = store.stats().await?;
            println!("Collection: {}", stats.collection);
            println!("Chunks:     {}", stats.count);
            println!("Dimension:  {}", stats.dimension);
            println!("Metric:     {}", stats.metric);
        }

        Commands::Clear => {
            store.clear().await?;
            println!("Collection cleared.");
        }

        Commands::Serve => {
            let orchestrator = build_orchestrator(&cfg, gateway, store.clone(), None, None);
            let state = AppState {
                executor: Arc::new(TaskExecutor::new(Arc::new(orchestrator))),
                store,
            };
            println!("Serving on http://{}", cfg.server.bind);
            server::serve(state, &cfg.server.bind).await?;
        }
    }

    Ok(())
}
