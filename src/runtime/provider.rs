//! Agent runtime abstraction
//!
//! Every backend an agent can run on (a hosted agent API or a model server
//! on the local machine) is driven through the same `AgentRuntime` trait, so
//! the handoff coordinator never needs to know which one it is talking to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Message roles in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Optional generation parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    /// Overrides the runtime's configured model
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl RequestParams {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Where a runtime is hosted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Model server on this machine (eligible for local fallback)
    Local,
    /// Remote agent service
    #[default]
    Remote,
}

/// Uniform capability the handoff coordinator drives
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Runtime name, used for logging
    fn name(&self) -> &str;

    fn kind(&self) -> RuntimeKind;

    /// Multi-message chat completion returning the reply text
    async fn send_chat_request(
        &self,
        messages: &[Message],
        params: &RequestParams,
    ) -> Result<String, RuntimeError>;

    /// Single-prompt inference; defaults to a one-message chat
    async fn send_inference_request(
        &self,
        prompt: &str,
        params: &RequestParams,
    ) -> Result<String, RuntimeError> {
        self.send_chat_request(&[Message::user(prompt)], params)
            .await
    }

    /// Cheap health probe
    async fn is_available(&self) -> bool;
}

/// Runtime call errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    #[error("Runtime not configured: {0}")]
    NotConfigured(String),
    #[error("Runtime unavailable: {0}")]
    Unavailable(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Model not found: {0}")]
    ModelNotFound(String),
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("API error: {0}")]
    ApiError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoRuntime;

    #[async_trait]
    impl AgentRuntime for EchoRuntime {
        fn name(&self) -> &str {
            "echo"
        }

        fn kind(&self) -> RuntimeKind {
            RuntimeKind::Local
        }

        async fn send_chat_request(
            &self,
            messages: &[Message],
            _params: &RequestParams,
        ) -> Result<String, RuntimeError> {
            Ok(messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("|"))
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_inference_defaults_to_single_user_message() {
        let reply = EchoRuntime
            .send_inference_request("hello", &RequestParams::default())
            .await
            .unwrap();
        assert_eq!(reply, "hello");
    }

    #[test]
    fn test_message_role_serialization() {
        assert_eq!(
            serde_json::to_string(&MessageRole::System).unwrap(),
            "\"system\""
        );
        assert_eq!(
            serde_json::to_string(&Message::user("hi")).unwrap(),
            r#"{"role":"user","content":"hi"}"#
        );
    }

    #[test]
    fn test_runtime_kind_parses_lowercase() {
        let kind: RuntimeKind = serde_json::from_str("\"local\"").unwrap();
        assert_eq!(kind, RuntimeKind::Local);
        assert_eq!(RuntimeKind::default(), RuntimeKind::Remote);
    }

    #[test]
    fn test_runtime_error_display() {
        let errors = vec![
            RuntimeError::NotConfigured("x".to_string()),
            RuntimeError::Unavailable("x".to_string()),
            RuntimeError::RateLimitExceeded("x".to_string()),
            RuntimeError::NetworkError("x".to_string()),
        ];
        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
