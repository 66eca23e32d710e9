//! Embedding services for retrieval memory

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// Trait for text embedding services
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed every text, in input order
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Model identifier for logging
    fn model_name(&self) -> &str;
}

/// Shared embedder type
pub type SharedEmbedder = Arc<dyn Embedder>;

/// OpenAI embeddings client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAIEmbedder {
    /// Create embedder with default model (text-embedding-3-small)
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, "text-embedding-3-small".to_string())
    }

    pub fn with_model(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    /// Create from environment variable
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key))
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        #[derive(Debug, Deserialize)]
        struct EmbeddingResponse {
            data: Vec<EmbeddingData>,
        }
        #[derive(Debug, Deserialize)]
        struct EmbeddingData {
            embedding: Vec<f32>,
            #[serde(default)]
            index: usize,
        }

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": self.model,
                "input": texts
            }))
            .send()
            .await?
            .error_for_status()?
            .json::<EmbeddingResponse>()
            .await?;

        // Sort by index to maintain order
        let mut embeddings = response.data;
        embeddings.sort_by_key(|d| d.index);

        if embeddings.len() != texts.len() {
            return Err(anyhow!(
                "OpenAI returned {} embeddings for {} texts",
                embeddings.len(),
                texts.len()
            ));
        }
        Ok(embeddings.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Gemini embeddings client (`batchEmbedContents`)
pub struct GeminiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiEmbedder {
    /// Create embedder with default model (gemini-embedding-001)
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, "gemini-embedding-001".to_string())
    }

    pub fn with_model(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow!("GEMINI_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key))
    }

    fn request_body(&self, texts: &[&str]) -> serde_json::Value {
        let model = format!("models/{}", self.model);
        let requests: Vec<_> = texts
            .iter()
            .map(|text| {
                serde_json::json!({
                    "model": model,
                    "content": {"parts": [{"text": text}]}
                })
            })
            .collect();
        serde_json::json!({ "requests": requests })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        #[derive(Debug, Deserialize)]
        struct BatchResponse {
            #[serde(default)]
            embeddings: Vec<ContentEmbedding>,
        }
        #[derive(Debug, Deserialize)]
        struct ContentEmbedding {
            values: Vec<f32>,
        }

        let response = self
            .client
            .post(format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:batchEmbedContents",
                self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(texts))
            .send()
            .await?
            .error_for_status()?
            .json::<BatchResponse>()
            .await?;

        if response.embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Gemini returned {} embeddings for {} texts",
                response.embeddings.len(),
                texts.len()
            ));
        }
        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
