//! Backend Selection
//!
//! Enums for selecting the text-generation and embedding providers.

use anyhow::{anyhow, Result};
use std::str::FromStr;

/// LLM backend provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentBackend {
    /// Anthropic Claude (default)
    #[default]
    Anthropic,
    /// OpenAI GPT
    OpenAi,
    /// Google Gemini
    Gemini,
}

impl AgentBackend {
    /// Create from AGENT_BACKEND environment variable
    ///
    /// Valid values: "anthropic", "claude", "openai", "gpt", "gemini"
    /// Defaults to Anthropic if not set
    pub fn from_env() -> Result<Self> {
        let value = std::env::var("AGENT_BACKEND").unwrap_or_else(|_| "anthropic".to_string());
        value
            .parse()
            .map_err(|e: ParseBackendError| anyhow!("{}", e))
    }

    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            AgentBackend::Anthropic => "Anthropic",
            AgentBackend::OpenAi => "OpenAI",
            AgentBackend::Gemini => "Gemini",
        }
    }

    /// Embedding provider used when EMBEDDING_BACKEND is not set.
    /// Anthropic has no embeddings API, so it falls back to OpenAI.
    pub fn default_embedding(&self) -> EmbeddingBackend {
        match self {
            AgentBackend::Gemini => EmbeddingBackend::Gemini,
            AgentBackend::Anthropic | AgentBackend::OpenAi => EmbeddingBackend::OpenAi,
        }
    }
}

/// Embedding provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingBackend {
    #[default]
    OpenAi,
    Gemini,
}

impl EmbeddingBackend {
    /// Create from EMBEDDING_BACKEND, falling back to the LLM backend's default
    pub fn from_env(agent: AgentBackend) -> Result<Self> {
        match std::env::var("EMBEDDING_BACKEND") {
            Ok(value) => value
                .parse()
                .map_err(|e: ParseBackendError| anyhow!("{}", e)),
            Err(_) => Ok(agent.default_embedding()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EmbeddingBackend::OpenAi => "OpenAI",
            EmbeddingBackend::Gemini => "Gemini",
        }
    }
}

/// Error type for parsing backend names
#[derive(Debug)]
pub struct ParseBackendError(String);

impl std::fmt::Display for ParseBackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseBackendError {}

impl FromStr for AgentBackend {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(AgentBackend::Anthropic),
            "openai" | "gpt" => Ok(AgentBackend::OpenAi),
            "gemini" => Ok(AgentBackend::Gemini),
            other => Err(ParseBackendError(format!(
                "Unknown AGENT_BACKEND '{}'. Valid values: anthropic, claude, openai, gpt, gemini",
                other
            ))),
        }
    }
}

impl FromStr for EmbeddingBackend {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(EmbeddingBackend::OpenAi),
            "gemini" => Ok(EmbeddingBackend::Gemini),
            other => Err(ParseBackendError(format!(
                "Unknown EMBEDDING_BACKEND '{}'. Valid values: openai, gemini",
                other
            ))),
        }
    }
}

impl std::fmt::Display for AgentBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!(
            "anthropic".parse::<AgentBackend>().unwrap(),
            AgentBackend::Anthropic
        );
        assert_eq!(
            "claude".parse::<AgentBackend>().unwrap(),
            AgentBackend::Anthropic
        );
        assert_eq!(
            "OpenAI".parse::<AgentBackend>().unwrap(),
            AgentBackend::OpenAi
        );
        assert_eq!("gpt".parse::<AgentBackend>().unwrap(), AgentBackend::OpenAi);
        assert_eq!(
            "Gemini".parse::<AgentBackend>().unwrap(),
            AgentBackend::Gemini
        );
        assert!("invalid".parse::<AgentBackend>().is_err());
    }

    #[test]
    fn test_embedding_backend() {
        assert_eq!(
            "gemini".parse::<EmbeddingBackend>().unwrap(),
            EmbeddingBackend::Gemini
        );
        assert!("claude".parse::<EmbeddingBackend>().is_err());
        assert_eq!(
            AgentBackend::Anthropic.default_embedding(),
            EmbeddingBackend::OpenAi
        );
        assert_eq!(
            AgentBackend::Gemini.default_embedding(),
            EmbeddingBackend::Gemini
        );
    }
}
