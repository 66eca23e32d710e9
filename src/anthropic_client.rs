//! Anthropic Client
//!
//! LLM client for the Anthropic Messages API. JSON requests prefill the
//! assistant turn with `{` so the reply starts inside the plan object.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::llm_client::{
    preview, LlmClient, GENERATION_TEMPERATURE, JSON_ONLY_INSTRUCTION, MAX_OUTPUT_TOKENS,
};

/// Default Anthropic model
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const JSON_PREFILL: &str = "{";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

impl<'a> MessagesRequest<'a> {
    fn new(model: &'a str, system: &'a str, user: &'a str, json_mode: bool) -> Self {
        let mut messages = vec![Message {
            role: "user",
            content: user,
        }];
        if json_mode {
            messages.push(Message {
                role: "assistant",
                content: JSON_PREFILL,
            });
        }
        Self {
            model,
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: GENERATION_TEMPERATURE,
            system,
            messages,
        }
    }
}

impl MessagesResponse {
    /// Join the text blocks, restoring the prefill the model continued from
    fn into_text(self, json_mode: bool) -> Result<String> {
        if self.stop_reason.as_deref() == Some("max_tokens") {
            warn!("Anthropic response hit the {} token cap", MAX_OUTPUT_TOKENS);
        }

        let body: String = self.content.into_iter().filter_map(|c| c.text).collect();
        if body.trim().is_empty() {
            return Err(anyhow!("Empty response from Anthropic"));
        }

        let body = body.trim();
        if json_mode && !body.starts_with(JSON_PREFILL) {
            Ok(format!("{}{}", JSON_PREFILL, body))
        } else {
            Ok(body.to_string())
        }
    }
}

/// Anthropic Claude API client
#[derive(Clone)]
pub struct AnthropicClient {
    api_key: String,
    client: reqwest::Client,
    model: String,
}

impl AnthropicClient {
    /// Create a new Anthropic client with the given API key
    pub fn new(api_key: String) -> Self {
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::with_model(api_key, &model)
    }

    /// Create with a specific model
    pub fn with_model(api_key: String, model: &str) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            model: model.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key))
    }

    async fn call_api(&self, system_prompt: &str, user_prompt: &str, json_mode: bool) -> Result<String> {
        let request = MessagesRequest::new(&self.model, system_prompt, user_prompt, json_mode);

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Anthropic API error {}: {}", status, body));
        }

        let api_response: MessagesResponse = response.json().await?;
        let text = api_response.into_text(json_mode)?;
        debug!("Anthropic response: {}", preview(&text, 500));
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.call_api(system_prompt, user_prompt, false).await
    }

    async fn chat_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let json_system = format!("{}\n\n{}", system_prompt, JSON_ONLY_INSTRUCTION);
        self.call_api(&json_system, user_prompt, true).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "Anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_request_prefills_assistant_turn() {
        let request = MessagesRequest::new("m", "sys", "Question: total?", true);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["max_tokens"], 5000);
        assert!((value["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(value["system"], "sys");
        assert_eq!(
            value["messages"],
            json!([
                {"role": "user", "content": "Question: total?"},
                {"role": "assistant", "content": "{"}
            ])
        );

        let plain = serde_json::to_value(MessagesRequest::new("m", "sys", "hi", false)).unwrap();
        assert_eq!(plain["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_response_restores_prefill() {
        let response: MessagesResponse = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "\"type\": \"explain\"}"}],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert_eq!(response.into_text(true).unwrap(), r#"{"type": "explain"}"#);

        let response: MessagesResponse = serde_json::from_value(json!({
            "content": [{"type": "text", "text": " South "}, {"type": "text", "text": "leads."}],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert_eq!(response.into_text(false).unwrap(), "South leads.");
    }

    #[test]
    fn test_empty_response_is_an_error() {
        let response: MessagesResponse =
            serde_json::from_value(json!({"content": [], "stop_reason": "max_tokens"})).unwrap();
        assert!(response.into_text(false).is_err());
    }

    #[test]
    fn test_with_model() {
        let client = AnthropicClient::with_model("test-key".to_string(), "claude-3-opus");
        assert_eq!(client.model_name(), "claude-3-opus");
        assert_eq!(client.provider_name(), "Anthropic");
    }
}
