//! HTTP implementations of the gateway traits.
//!
//! [`HttpLanguageGateway`] speaks an OpenAI-compatible JSON API
//! (`POST /v1/embeddings`, `POST /v1/completions`); [`HttpVectorStore`]
//! speaks a collection-scoped JSON API. Neither retries — they classify
//! failures as transient or fatal and leave retrying to the call sites.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{GatewayConfig, StoreConfig};
use crate::error::{RagError, Result};
use crate::models::{CollectionStats, RetrievalMatch};

use super::{LanguageGateway, VectorRecord, VectorStore};

fn transport_error(service: &str, e: reqwest::Error) -> RagError {
    // Timeouts, refused connections, and mid-flight drops are all worth
    // retrying; reqwest does not expose a finer split that matters here.
    RagError::TransientUpstream(format!("{}: {}", service, e))
}

/// Map an HTTP error status onto the taxonomy: 429 and 5xx are transient,
/// any other non-success status is a hard rejection.
async fn classify_status(service: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status.as_u16() == 429 || status.is_server_error() {
        Err(RagError::TransientUpstream(format!(
            "{} returned {}: {}",
            service, status, body
        )))
    } else {
        Err(RagError::FatalUpstream(format!(
            "{} returned {}: {}",
            service, status, body
        )))
    }
}

// ============ Embedding/generation gateway ============

/// Client for the embedding/generation service.
///
/// Embedding and generation calls carry distinct timeout budgets
/// (generation is typically much slower), so each gets its own
/// pre-configured `reqwest::Client`.
pub struct HttpLanguageGateway {
    embed_client: reqwest::Client,
    generate_client: reqwest::Client,
    base_url: String,
    embed_model: String,
    generate_model: String,
    api_key: Option<String>,
}

impl HttpLanguageGateway {
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                RagError::Validation(format!("environment variable {} not set", var))
            })?),
            None => None,
        };

        let build = |timeout_secs: u64| {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .map_err(|e| RagError::Validation(format!("failed to build HTTP client: {}", e)))
        };

        Ok(Self {
            embed_client: build(config.embed_timeout_secs)?,
            generate_client: build(config.generate_timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            embed_model: config.embed_model.clone(),
            generate_model: config.generate_model.clone(),
            api_key,
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("Authorization", format!("Bearer {}", key)),
            None => req,
        }
    }

    async fn post_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.embed_model,
            "input": texts,
        });

        let response = self
            .authorize(self.embed_client.post(format!("{}/v1/embeddings", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("embedding gateway", e))?;

        let response = classify_status("embedding gateway", response).await?;
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::FatalUpstream(format!("malformed embedding response: {}", e)))?;

        parse_embeddings(&json)
    }
}

fn parse_embeddings(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| {
            RagError::FatalUpstream("malformed embedding response: missing data array".to_string())
        })?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                RagError::FatalUpstream(
                    "malformed embedding response: missing embedding".to_string(),
                )
            })?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }

    Ok(embeddings)
}

#[async_trait::async_trait]
impl LanguageGateway for HttpLanguageGateway {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.post_embeddings(&[text.to_string()]).await?;
        results.into_iter().next().ok_or_else(|| {
            RagError::FatalUpstream("empty embedding response".to_string())
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let results = self.post_embeddings(texts).await?;
        if results.len() != texts.len() {
            return Err(RagError::FatalUpstream(format!(
                "embedding count mismatch: sent {}, received {}",
                texts.len(),
                results.len()
            )));
        }
        Ok(results)
    }

    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        let body = serde_json::json!({
            "model": self.generate_model,
            "prompt": prompt,
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        debug!(model = %self.generate_model, max_tokens, "generation request");

        let response = self
            .authorize(
                self.generate_client
                    .post(format!("{}/v1/completions", self.base_url)),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("generation gateway", e))?;

        let response = classify_status("generation gateway", response).await?;
        let json: serde_json::Value = response.json().await.map_err(|e| {
            RagError::FatalUpstream(format!("malformed generation response: {}", e))
        })?;

        json.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("text"))
            .and_then(|t| t.as_str())
            .map(|t| t.trim().to_string())
            .ok_or_else(|| {
                RagError::FatalUpstream(
                    "malformed generation response: missing choices[0].text".to_string(),
                )
            })
    }
}

// ============ Vector store gateway ============

#[derive(Serialize)]
struct WireRecord<'a> {
    chunk_id: &'a str,
    vector: &'a [f32],
    text: &'a str,
    source_path: &'a str,
}

#[derive(Deserialize)]
struct WireHit {
    chunk_id: String,
    text: String,
    source_path: String,
    score: f32,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Vec<WireHit>,
}

#[derive(Deserialize)]
struct StatsResponse {
    count: u64,
    dimension: usize,
    metric: String,
}

/// Client for the vector store's collection-scoped JSON API.
pub struct HttpVectorStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
}

impl HttpVectorStore {
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Validation(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
        })
    }

    fn url(&self, op: &str) -> String {
        format!("{}/collections/{}/{}", self.base_url, self.collection, op)
    }

    async fn post(&self, op: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.url(op))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("vector store", e))?;
        classify_status("vector store", response).await
    }
}

#[async_trait::async_trait]
impl VectorStore for HttpVectorStore {
    async fn insert(&self, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let wire: Vec<WireRecord> = records
            .iter()
            .map(|r| WireRecord {
                chunk_id: &r.chunk_id,
                vector: &r.vector,
                text: &r.text,
                source_path: &r.source_path,
            })
            .collect();
        self.post("insert", serde_json::json!({ "records": wire }))
            .await?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievalMatch>> {
        let response = self
            .post("search", serde_json::json!({ "vector": vector, "top_k": top_k }))
            .await?;

        let parsed: SearchResponse = response.json().await.map_err(|e| {
            RagError::FatalUpstream(format!("malformed search response: {}", e))
        })?;

        Ok(parsed
            .hits
            .into_iter()
            .map(|h| RetrievalMatch {
                chunk_id: h.chunk_id,
                text: h.text,
                source_path: h.source_path,
                score: h.score,
            })
            .collect())
    }

    async fn delete(&self, chunk_ids: &[String]) -> Result<()> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        self.post("delete", serde_json::json!({ "chunk_ids": chunk_ids }))
            .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<CollectionStats> {
        let response = self
            .client
            .get(self.url("stats"))
            .send()
            .await
            .map_err(|e| transport_error("vector store", e))?;
        let response = classify_status("vector store", response).await?;

        let parsed: StatsResponse = response.json().await.map_err(|e| {
            RagError::FatalUpstream(format!("malformed stats response: {}", e))
        })?;

        Ok(CollectionStats {
            collection: self.collection.clone(),
            count: parsed.count,
            dimension: parsed.dimension,
            metric: parsed.metric,
        })
    }

    async fn clear(&self) -> Result<()> {
        self.post("clear", serde_json::json!({})).await?;
        Ok(())
    }
}
