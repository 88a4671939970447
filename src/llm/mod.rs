//! Chat-completion client for OpenAI-compatible endpoints.
//!
//! Thin typed wrapper over `POST {base_url}/chat/completions` with bearer
//! auth. Response parsing is a pure function so the error paths are testable
//! without a live endpoint.

use crate::config::LlmConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Errors surfaced by the chat-completion client.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("no API key: set `llm.api_key` in the config or the {0} env var")]
    MissingApiKey(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed completion response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("completion had no content (finish_reason: {reason})")]
    EmptyContent { reason: String },
}

/// One chat message in a completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Client for one configured chat-completion endpoint.
#[derive(Debug)]
pub struct ChatClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl ChatClient {
    /// Build a client from config. Fails when no API key can be resolved or
    /// the underlying HTTP client cannot be constructed.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| LlmError::MissingApiKey(config.api_key_env.clone()))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    /// Request a completion and return the assistant message content.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        parse_completion_body(&body)
    }

    /// Single-user-message convenience wrapper.
    pub async fn complete_prompt(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        self.complete(&[ChatMessage::user(prompt)], max_tokens).await
    }
}

/// Extract the first choice's content from a completion response body.
fn parse_completion_body(body: &str) -> Result<String, LlmError> {
    let response: CompletionResponse = serde_json::from_str(body)?;

    let Some(choice) = response.choices.first() else {
        return Err(LlmError::EmptyContent {
            reason: "no choices".to_string(),
        });
    };

    let content = choice.message.content.clone().unwrap_or_default();
    if content.trim().is_empty() {
        let reason = choice
            .finish_reason
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        return Err(LlmError::EmptyContent { reason });
    }

    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_completion() {
        let body = r#"{
            "choices": [
                {
                    "message": {"role": "assistant", "content": "A concise summary."},
                    "finish_reason": "stop"
                }
            ],
            "model": "Llama-3.3-70B-Instruct"
        }"#;
        assert_eq!(parse_completion_body(body).unwrap(), "A concise summary.");
    }

    #[test]
    fn test_parse_empty_choices() {
        let body = r#"{"choices": []}"#;
        let err = parse_completion_body(body).unwrap_err();
        assert!(matches!(err, LlmError::EmptyContent { .. }));
    }

    #[test]
    fn test_parse_empty_content_carries_finish_reason() {
        let body = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": ""}, "finish_reason": "length"}
            ]
        }"#;
        match parse_completion_body(body).unwrap_err() {
            LlmError::EmptyContent { reason } => assert_eq!(reason, "length"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_malformed_body() {
        let err = parse_completion_body("not json").unwrap_err();
        assert!(matches!(err, LlmError::Malformed(_)));
    }

    #[test]
    fn test_missing_api_key() {
        let config = LlmConfig {
            api_key: None,
            api_key_env: "DEEP_RESEARCH_TEST_KEY_UNSET".to_string(),
            ..LlmConfig::default()
        };
        let err = ChatClient::new(&config).unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey(_)));
    }

    #[test]
    fn test_message_constructors() {
        let system = ChatMessage::system("be brief");
        assert_eq!(system.role, "system");
        let user = ChatMessage::user("hello");
        assert_eq!(user.role, "user");
        assert_eq!(user.content, "hello");
    }
}
