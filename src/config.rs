use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Embedding/generation gateway connection settings.
///
/// Generation calls get a larger timeout budget than embedding calls;
/// both feed the same retry policy.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub embed_model: String,
    pub generate_model: String,
    /// Environment variable holding the API key, if the gateway needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,
    #[serde(default = "default_generate_timeout_secs")]
    pub generate_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

fn default_embed_timeout_secs() -> u64 {
    30
}
fn default_generate_timeout_secs() -> u64 {
    120
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    500
}

/// Vector store connection settings. All operations are scoped to one
/// named collection per deployment.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub base_url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Embedding dimension for the collection. A vector of any other
    /// dimension is a fatal configuration error.
    pub dimension: usize,
    #[serde(default = "default_metric")]
    pub metric: String,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_collection() -> String {
    "rag_knowledge_base".to_string()
}
fn default_metric() -> String {
    "cosine".to_string()
}
fn default_store_timeout_secs() -> u64 {
    30
}

/// Word-window chunking parameters.
///
/// `max_words` must keep the worst-case token count of a chunk under the
/// embedding backend's token ceiling; at roughly 1.3 tokens per word the
/// default of 80 words stays comfortably below common ceilings.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_words")]
    pub max_words: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_words: default_max_words(),
            overlap_words: default_overlap_words(),
        }
    }
}

fn default_max_words() -> usize {
    80
}
fn default_overlap_words() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            score_threshold: default_score_threshold(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_score_threshold() -> f32 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisConfig {
    /// Context window budget in characters. Whole chunks only.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_context_chars: default_max_context_chars(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_max_context_chars() -> usize {
    6000
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_query_chars: default_max_query_chars(),
        }
    }
}

fn default_max_query_chars() -> usize {
    4000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8470".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_words == 0 {
        anyhow::bail!("chunking.max_words must be > 0");
    }
    if config.chunking.overlap_words >= config.chunking.max_words {
        anyhow::bail!(
            "chunking.overlap_words ({}) must be < chunking.max_words ({})",
            config.chunking.overlap_words,
            config.chunking.max_words
        );
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.score_threshold) {
        anyhow::bail!("retrieval.score_threshold must be in [-1.0, 1.0]");
    }

    if config.store.dimension == 0 {
        anyhow::bail!("store.dimension must be > 0");
    }
    match config.store.metric.as_str() {
        "cosine" | "ip" | "l2" => {}
        other => anyhow::bail!("Unknown store.metric: '{}'. Must be cosine, ip, or l2.", other),
    }

    if config.synthesis.max_context_chars == 0 {
        anyhow::bail!("synthesis.max_context_chars must be > 0");
    }
    if config.gateway.max_attempts == 0 {
        anyhow::bail!("gateway.max_attempts must be >= 1");
    }

    Ok(config)
}
