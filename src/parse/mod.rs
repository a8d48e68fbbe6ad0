//! Client for the hosted document parsing/chunking service.
//!
//! Retrieval ingestion does not split documents locally; a staged file is
//! shipped to the parse service, which returns ordered chunks ready for
//! embedding. The client mirrors the service's single-call contract: one
//! upload, one chunk list, no polling.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Errors surfaced while talking to the parse service.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The staged document could not be read from disk.
    #[error("Failed to read staged document: {0}")]
    Staging(#[from] std::io::Error),
    /// The service could not be reached.
    #[error("Parse service unavailable: {0}")]
    ServiceUnavailable(String),
    /// The service rejected the document or failed internally.
    #[error("Failed to parse document: {0}")]
    ParseFailed(String),
    /// The service response could not be decoded.
    #[error("Malformed parse service response: {0}")]
    InvalidResponse(String),
}

/// Output format requested from the parse service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResultFormat {
    /// Structured markup preserving headings and emphasis.
    #[default]
    Markdown,
    /// Plain text with layout discarded.
    Text,
}

impl ResultFormat {
    fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Text => "text",
        }
    }
}

/// Options forwarded with every parse request.
#[derive(Clone, Debug)]
pub struct ParseOptions {
    /// Language hint for the service's text recognition.
    pub language: String,
    /// Desired chunk markup format.
    pub result_format: ResultFormat,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            result_format: ResultFormat::Markdown,
        }
    }
}

/// One chunk of parsed document content, in document order.
#[derive(Clone, Debug, Deserialize)]
pub struct DocumentChunk {
    /// Chunk text in the requested result format.
    pub text: String,
    /// 1-indexed source page, when the service reports one.
    #[serde(default)]
    pub page: Option<u32>,
}

/// Interface implemented by document parsing backends.
#[async_trait]
pub trait ChunkParser: Send + Sync {
    /// Parse the staged file into ordered chunks.
    async fn parse_file(
        &self,
        api_key: &str,
        path: &Path,
        options: &ParseOptions,
    ) -> Result<Vec<DocumentChunk>, ParseError>;
}

/// HTTP client for the hosted parse service.
pub struct ParseServiceClient {
    http: Client,
    base_url: String,
}

impl ParseServiceClient {
    /// Construct a client against the given service base URL.
    pub fn new(base_url: String) -> Self {
        let http = Client::builder()
            .user_agent("docuchat/parse")
            .build()
            .expect("Failed to construct reqwest::Client for parsing");
        Self { http, base_url }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/parse", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    chunks: Vec<DocumentChunk>,
}

#[async_trait]
impl ChunkParser for ParseServiceClient {
    async fn parse_file(
        &self,
        api_key: &str,
        path: &Path,
        options: &ParseOptions,
    ) -> Result<Vec<DocumentChunk>, ParseError> {
        let bytes = tokio::fs::read(path).await?;

        let response = self
            .http
            .post(self.endpoint())
            .query(&[
                ("language", options.language.as_str()),
                ("result_format", options.result_format.as_str()),
            ])
            .bearer_auth(api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(bytes)
            .send()
            .await
            .map_err(|error| {
                ParseError::ServiceUnavailable(format!(
                    "failed to reach parse service at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ParseError::ServiceUnavailable(format!(
                "parse endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ParseError::ParseFailed(format!(
                "parse service returned {status}: {body}"
            )));
        }

        let body: ParseResponse = response.json().await.map_err(|error| {
            ParseError::InvalidResponse(format!("failed to decode parse response: {error}"))
        })?;

        tracing::debug!(chunks = body.chunks.len(), "Parse service returned chunks");
        Ok(body.chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;
    use std::io::Write;

    fn staged_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents).expect("write staged bytes");
        file
    }

    #[tokio::test]
    async fn parse_client_decodes_chunk_list() {
        let server = MockServer::start_async().await;
        let client = ParseServiceClient::new(server.base_url());
        let staged = staged_file(b"%PDF-1.5 fake");

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/parse")
                    .query_param("language", "en")
                    .query_param("result_format", "markdown")
                    .header("authorization", "Bearer key-123");
                then.status(200).json_body(json!({
                    "chunks": [
                        { "text": "# Heading", "page": 1 },
                        { "text": "Body text" }
                    ]
                }));
            })
            .await;

        let chunks = client
            .parse_file("key-123", staged.path(), &ParseOptions::default())
            .await
            .expect("chunks");

        mock.assert();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "# Heading");
        assert_eq!(chunks[0].page, Some(1));
        assert_eq!(chunks[1].page, None);
    }

    #[tokio::test]
    async fn parse_client_reports_error_status() {
        let server = MockServer::start_async().await;
        let client = ParseServiceClient::new(server.base_url());
        let staged = staged_file(b"%PDF-1.5 fake");

        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/parse");
                then.status(500).body("boom");
            })
            .await;

        let error = client
            .parse_file("key-123", staged.path(), &ParseOptions::default())
            .await
            .expect_err("error response");

        assert!(matches!(error, ParseError::ParseFailed(message) if message.contains("500")));
    }

    #[tokio::test]
    async fn parse_client_flags_malformed_body() {
        let server = MockServer::start_async().await;
        let client = ParseServiceClient::new(server.base_url());
        let staged = staged_file(b"%PDF-1.5 fake");

        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/parse");
                then.status(200).body("not json");
            })
            .await;

        let error = client
            .parse_file("key-123", staged.path(), &ParseOptions::default())
            .await
            .expect_err("malformed response");

        assert!(matches!(error, ParseError::InvalidResponse(_)));
    }
}
