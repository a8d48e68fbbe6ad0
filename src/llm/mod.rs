//! Chat-completion client abstraction and the OpenAI-compatible adapter.
//!
//! Both answer synthesis and document summaries go through this interface:
//! a model identifier, a role-tagged message sequence, an output-token cap,
//! and a sampling temperature in; generated text out.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The completion API could not be reached.
    #[error("Completion API unavailable: {0}")]
    ApiUnavailable(String),
    /// The API returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// The API response could not be decoded or contained no choices.
    #[error("Malformed completion response: {0}")]
    InvalidResponse(String),
}

/// Message author role understood by the completion API.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction framing for the model.
    System,
    /// Content supplied on behalf of the user.
    User,
    /// A prior model turn.
    Assistant,
}

/// One role-tagged message in a completion request.
#[derive(Clone, Debug, Serialize)]
pub struct ChatMessage {
    /// Author role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Parameters for a single completion call.
#[derive(Clone, Debug, Serialize)]
pub struct CompletionRequest {
    /// Model identifier understood by the API.
    pub model: String,
    /// Ordered message sequence.
    pub messages: Vec<ChatMessage>,
    /// Hard cap on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Interface implemented by completion backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Submit one completion request and return the generated text.
    async fn complete(
        &self,
        api_key: &str,
        request: CompletionRequest,
    ) -> Result<String, CompletionError>;
}

/// Client for the OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiCompletionClient {
    http: Client,
    base_url: String,
}

impl OpenAiCompletionClient {
    /// Construct a client against the given API base URL.
    pub fn new(base_url: String) -> Self {
        let http = Client::builder()
            .user_agent("docuchat/completions")
            .build()
            .expect("Failed to construct reqwest::Client for completions");
        Self { http, base_url }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(
        &self,
        api_key: &str,
        request: CompletionRequest,
    ) -> Result<String, CompletionError> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                CompletionError::ApiUnavailable(format!(
                    "failed to reach completion API at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(CompletionError::GenerationFailed(
                "completion API rejected the supplied credentials".to_string(),
            ));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::GenerationFailed(format!(
                "completion API returned {status}: {body}"
            )));
        }

        let body: CompletionResponse = response.json().await.map_err(|error| {
            CompletionError::InvalidResponse(format!(
                "failed to decode completion response: {error}"
            ))
        })?;

        let choice = body.choices.into_iter().next().ok_or_else(|| {
            CompletionError::InvalidResponse("completion response contained no choices".to_string())
        })?;

        Ok(choice.message.content)
    }
}
