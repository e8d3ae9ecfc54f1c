//! OpenAI-compatible HTTP runtime
//!
//! Hosted agent APIs and most local model servers (Ollama, LM Studio,
//! llama.cpp) accept the same `/chat/completions` and `/completions`
//! request shape, so one client covers both; `RuntimeKind` records which
//! side of the network it lives on. Calls are single-shot: retrying is the
//! handoff coordinator's job.

use crate::runtime::provider::{
    AgentRuntime, Message, MessageRole, RequestParams, RuntimeError, RuntimeKind,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Connection settings for an OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// Label the runtime is registered under
    pub name: String,
    pub kind: RuntimeKind,
    /// Base URL including the version prefix, e.g. `http://localhost:11434/v1`
    pub base_url: String,
    pub model: String,
    /// Bearer token; local servers usually need none
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            name: "openai".to_string(),
            kind: RuntimeKind::Remote,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }
}

pub struct OpenAiCompatRuntime {
    config: OpenAiCompatConfig,
    client: Client,
}

impl OpenAiCompatRuntime {
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, RuntimeError> {
        if config.base_url.trim().is_empty() {
            return Err(RuntimeError::NotConfigured(format!(
                "runtime '{}' has no base_url",
                config.name
            )));
        }
        if config.kind == RuntimeKind::Remote && config.api_key.as_deref().unwrap_or("").is_empty()
        {
            warn!(runtime = %config.name, "Remote runtime configured without an API key");
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RuntimeError::NetworkError(e.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OpenAiCompatConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => builder.bearer_auth(key),
            _ => builder,
        }
    }

    /// Convert internal message to wire format (pure)
    fn convert_message(message: &Message) -> WireMessage {
        WireMessage {
            role: match message.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
            }
            .to_string(),
            content: Some(message.content.clone()),
        }
    }

    /// Map a non-success status to a runtime error (pure)
    fn error_for_status(status: StatusCode, body: &str) -> RuntimeError {
        let detail = format!("{status} - {body}");
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                RuntimeError::AuthenticationFailed(detail)
            }
            StatusCode::NOT_FOUND => RuntimeError::ModelNotFound(detail),
            StatusCode::TOO_MANY_REQUESTS => RuntimeError::RateLimitExceeded(detail),
            StatusCode::SERVICE_UNAVAILABLE => RuntimeError::Unavailable(detail),
            s if s.is_server_error() => RuntimeError::ApiError(format!("server error: {detail}")),
            _ => RuntimeError::RequestFailed(detail),
        }
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, RuntimeError>
    where
        Req: Serialize + ?Sized,
        Resp: for<'de> Deserialize<'de>,
    {
        let response = self
            .request(self.client.post(self.endpoint(path)))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                RuntimeError::NetworkError(format!(
                    "HTTP request failed: {} (is_connect: {}, is_timeout: {})",
                    e,
                    e.is_connect(),
                    e.is_timeout()
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(runtime = %self.config.name, status = %status, "Runtime request rejected");
            return Err(Self::error_for_status(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| RuntimeError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl AgentRuntime for OpenAiCompatRuntime {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> RuntimeKind {
        self.config.kind
    }

    async fn send_chat_request(
        &self,
        messages: &[Message],
        params: &RequestParams,
    ) -> Result<String, RuntimeError> {
        let request = ChatRequest {
            model: params
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
            messages: messages.iter().map(Self::convert_message).collect(),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        debug!(
            runtime = %self.config.name,
            messages = request.messages.len(),
            model = %request.model,
            "Sending chat request"
        );

        let response: ChatResponse = self.post("chat/completions", &request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RuntimeError::InvalidResponse("no choices returned".to_string()))
    }

    async fn send_inference_request(
        &self,
        prompt: &str,
        params: &RequestParams,
    ) -> Result<String, RuntimeError> {
        let request = CompletionRequest {
            model: params
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
            prompt: prompt.to_string(),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        let response: CompletionResponse = self.post("completions", &request).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or_else(|| RuntimeError::InvalidResponse("no choices returned".to_string()))
    }

    async fn is_available(&self) -> bool {
        match self
            .request(self.client.get(self.endpoint("models")))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(runtime = %self.config.name, error = %e, "Availability probe failed");
                false
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}
