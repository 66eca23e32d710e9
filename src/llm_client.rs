//! LLM Client Trait
//!
//! Unified interface for text-generation providers (Anthropic, OpenAI, Gemini).

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::GenerationError;

/// Unified LLM client interface
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Call the LLM with system + user prompts, return raw text response
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Call the LLM expecting JSON response
    /// - For OpenAI: uses response_format json_object mode
    /// - For Anthropic and Gemini: adds JSON instruction to system prompt
    async fn chat_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Get the model name for logging
    fn model_name(&self) -> &str;

    /// Get the provider name for logging
    fn provider_name(&self) -> &str;
}

/// Sampling temperature shared by every provider
pub(crate) const GENERATION_TEMPERATURE: f32 = 0.2;

/// Output token cap shared by every provider
pub(crate) const MAX_OUTPUT_TOKENS: u32 = 5000;

/// Instruction appended to system prompts by providers without a JSON mode
pub(crate) const JSON_ONLY_INSTRUCTION: &str =
    "IMPORTANT: Respond with valid JSON only. No markdown code blocks, no explanations.";

/// Await a provider call with a deadline.
///
/// Provider errors and elapsed deadlines both come back as [`GenerationError`].
pub async fn call_with_timeout<T, F>(
    operation: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, GenerationError>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(GenerationError::Provider {
            operation,
            message: format!("{:#}", e),
        }),
        Err(_) => Err(GenerationError::Timeout {
            operation,
            timeout: limit,
        }),
    }
}

/// First `max` characters of a response, for debug logging
pub(crate) fn preview(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[tokio::test]
    async fn test_call_with_timeout_passes_value_through() {
        let value = call_with_timeout("generation", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_call_with_timeout_wraps_provider_error() {
        let err = call_with_timeout::<(), _>("embedding", Duration::from_secs(1), async {
            Err(anyhow!("quota exceeded"))
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Provider { operation: "embedding", ref message } if message == "quota exceeded"
        ));
    }

    #[tokio::test]
    async fn test_call_with_timeout_elapses() {
        let err = call_with_timeout::<(), _>("generation", Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, GenerationError::Timeout { operation: "generation", .. }));
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        assert_eq!(preview("héllo", 2), "hé");
        assert_eq!(preview("hi", 10), "hi");
    }
}
