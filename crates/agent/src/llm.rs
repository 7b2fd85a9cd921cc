use std::time::Duration;

use async_trait::async_trait;
use insights_core::config::LlmConfig;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::conversation::{Message, ToolCall};

const APP_REFERER: &str = "https://civic-insights.local";
const APP_TITLE: &str = "Civic Insights";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request error: {0}")]
    Transport(String),
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String, body: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// One assistant turn. An empty `tool_calls` means the model is done.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), tool_calls: Vec::new() }
    }

    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self { content: None, tool_calls }
    }

    pub fn into_message(self) -> Message {
        Message::assistant(self.content, self.tool_calls)
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// OpenAI-compatible `chat/completions` client, pointed at OpenRouter by
/// default.
pub struct OpenRouterClient {
    client: Client,
    endpoint: String,
    api_key: SecretString,
}

impl OpenRouterClient {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ProviderError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ProviderError::Transport("llm.api_key is not configured".to_string()))?;
        Self::new(&config.base_url, api_key, Duration::from_secs(config.timeout_secs))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        debug!(
            event_name = "llm.request.sent",
            model = %request.model,
            message_count = request.messages.len(),
            tools = !request.tools.is_empty(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .header("HTTP-Referer", APP_REFERER)
            .header("X-Title", APP_TITLE)
            .json(request)
            .send()
            .await
            .map_err(|error| ProviderError::Transport(error.to_string()))?;

        let status = response.status();
        let body =
            response.text().await.map_err(|error| ProviderError::Transport(error.to_string()))?;

        let decoded = decode_completion(status, &body);
        if let Err(provider_error) = &decoded {
            error!(
                event_name = "llm.request.failed",
                status = status.as_u16(),
                error = %provider_error,
                "chat completion request failed"
            );
        }
        decoded
    }
}

#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

fn decode_completion(status: StatusCode, body: &str) -> Result<ChatResponse, ProviderError> {
    if !status.is_success() {
        return Err(ProviderError::Http { status: status.as_u16(), body: body.to_string() });
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|error| ProviderError::MalformedResponse(error.to_string()))?;
    if let Some(api_error) = value.get("error").filter(|error| !error.is_null()) {
        let message = api_error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| api_error.to_string());
        return Err(ProviderError::Api { status: status.as_u16(), message, body: body.to_string() });
    }

    let completion: CompletionBody = serde_json::from_value(value)
        .map_err(|error| ProviderError::MalformedResponse(error.to_string()))?;
    let choice = completion.choices.into_iter().next().ok_or_else(|| {
        ProviderError::MalformedResponse("response contained no choices".to_string())
    })?;

    Ok(ChatResponse {
        content: choice.message.content,
        tool_calls: choice.message.tool_calls.unwrap_or_default(),
    })
}
