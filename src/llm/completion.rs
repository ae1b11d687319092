//! Chat-completion client for Azure OpenAI compatible endpoints.
//!
//! The response body is returned as raw bytes after checking it is valid
//! JSON, so callers can persist exactly what the API sent.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::pipeline::config::PipelineConfig;

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender ("system" or "user").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request body for `POST <endpoint>/completions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier to use for generation.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<Message>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
        }
    }

    /// The fixed system + user conversation.
    pub fn conversation(
        model: impl Into<String>,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self::new(model, vec![Message::system(system), Message::user(user)])
    }
}

/// Client for a chat-completion endpoint.
///
/// Cloning is cheap: the underlying `reqwest::Client` shares one
/// connection pool between all clones.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    url: String,
    api_key: String,
    http_client: Client,
}

impl CompletionClient {
    /// Creates a client posting to `url` with bearer `api_key`.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::RequestFailed` if the HTTP client cannot be built.
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            api_key: api_key.into(),
            http_client,
        })
    }

    /// Creates a client for the configured endpoint and credentials.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, LlmError> {
        Self::new(
            config.completions_url(),
            config.azure.openai_api_key.clone(),
            config.generator.timeout,
        )
    }

    /// The URL requests are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts one completion request and returns the JSON body verbatim.
    ///
    /// # Errors
    ///
    /// - `LlmError::RequestFailed` on transport errors.
    /// - `LlmError::ApiError` on any status other than 200.
    /// - `LlmError::ParseError` if the body is not JSON.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<Vec<u8>, LlmError> {
        let http_response = self
            .http_client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();

        if status != StatusCode::OK {
            let message = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            tracing::error!(status = status.as_u16(), "API request failed with status {}", status);
            return Err(LlmError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        let body = http_response
            .bytes()
            .await
            .map_err(|e| LlmError::RequestFailed(format!("Failed to read response body: {e}")))?;

        serde_json::from_slice::<serde_json::Value>(&body)
            .map_err(|e| LlmError::ParseError(format!("Response is not JSON: {e}")))?;

        Ok(body.to_vec())
    }
}
