//! Client Factory
//!
//! Builds the configured LLM and embedding clients from the environment.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::anthropic_client::AnthropicClient;
use crate::backend::{AgentBackend, EmbeddingBackend};
use crate::embedder::{Embedder, GeminiEmbedder, OpenAIEmbedder};
use crate::gemini_client::GeminiClient;
use crate::llm_client::LlmClient;
use crate::openai_client::OpenAiClient;

/// Create the LLM client selected by AGENT_BACKEND
pub fn create_llm_client() -> Result<Arc<dyn LlmClient>> {
    create_llm_client_for(AgentBackend::from_env()?)
}

pub fn create_llm_client_for(backend: AgentBackend) -> Result<Arc<dyn LlmClient>> {
    let client: Arc<dyn LlmClient> = match backend {
        AgentBackend::Anthropic => Arc::new(AnthropicClient::from_env()?),
        AgentBackend::OpenAi => Arc::new(OpenAiClient::from_env()?),
        AgentBackend::Gemini => Arc::new(GeminiClient::from_env()?),
    };
    info!(
        "Using {} LLM backend (model {})",
        client.provider_name(),
        client.model_name()
    );
    Ok(client)
}

/// Create the embedder selected by EMBEDDING_BACKEND, defaulting from the LLM backend
pub fn create_embedder() -> Result<Arc<dyn Embedder>> {
    let backend = EmbeddingBackend::from_env(AgentBackend::from_env()?)?;
    create_embedder_for(backend)
}

pub fn create_embedder_for(backend: EmbeddingBackend) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match backend {
        EmbeddingBackend::OpenAi => Arc::new(OpenAIEmbedder::from_env()?),
        EmbeddingBackend::Gemini => Arc::new(GeminiEmbedder::from_env()?),
    };
    info!(
        "Using {} embeddings (model {})",
        backend,
        embedder.model_name()
    );
    Ok(embedder)
}
