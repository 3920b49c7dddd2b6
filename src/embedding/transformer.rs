//! Dense-transformer embedding backend (spec §4.2, §9: "a transformer-based
//! backend is an optional variant selected by configuration").
//!
//! Calls out to a local or remote embedding HTTP endpoint (e.g. an Ollama
//! server exposing `/api/embed`), batching requests per token-sequence.
//! `EmbeddingBackend::embed` is synchronous (the rest of the engine is pure
//! CPU, spec §5), so this wraps the async HTTP round-trip in a dedicated
//! current-thread Tokio runtime the same way the embedding-provider HTTP
//! calls are isolated from the rest of the pipeline.

use super::{l2_normalize, EmbeddingBackend, EmbeddingMatrix};
use serde::{Deserialize, Serialize};

/// Configuration for the transformer backend.
#[derive(Debug, Clone)]
pub struct TransformerConfig {
    pub endpoint: String,
    pub model: String,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
        }
    }
}

pub struct TransformerBackend {
    config: TransformerConfig,
    client: reqwest::Client,
}

impl TransformerBackend {
    #[must_use]
    pub fn new(config: TransformerConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl EmbeddingBackend for TransformerBackend {
    fn embed(&self, token_lists: &[Vec<String>]) -> EmbeddingMatrix {
        let texts: Vec<String> = token_lists.iter().map(|t| t.join(" ")).collect();

        let rows = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt.block_on(self.fetch_embeddings(&texts)),
            Err(_) => Vec::new(),
        };

        let dim = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut rows: Vec<Vec<f32>> = if rows.len() == texts.len() {
            rows
        } else {
            vec![vec![0.0; dim]; texts.len()]
        };

        for row in &mut rows {
            l2_normalize(row);
        }

        EmbeddingMatrix::new(rows)
    }
}

impl TransformerBackend {
    async fn fetch_embeddings(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let url = format!("{}/api/embed", self.config.endpoint);
        let request = EmbedRequest {
            model: &self.config.model,
            input: texts.to_vec(),
        };

        let response = match self.client.post(&url).json(&request).send().await {
            Ok(r) if r.status().is_success() => r,
            _ => return Vec::new(),
        };

        response
            .json::<EmbedResponse>()
            .await
            .map(|body| body.embeddings)
            .unwrap_or_default()
    }
}
