//! Data types and error definitions for the session workflow.

use crate::embedding::EmbeddingError;
use crate::index::{IndexError, QueryEngine, QueryEngineError};
use crate::llm::CompletionError;
use crate::parse::ParseError;
use crate::pdf::PdfError;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// API credentials captured from user input at session creation.
///
/// These are runtime values owned by one session; they are never read from
/// the environment and never persisted.
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    /// Key for the completion/embedding API.
    pub completion_api_key: String,
    /// Key for the hosted parse service.
    pub parse_api_key: String,
}

impl Credentials {
    /// Whether both keys are present and non-blank.
    pub fn is_complete(&self) -> bool {
        !self.completion_api_key.trim().is_empty() && !self.parse_api_key.trim().is_empty()
    }
}

/// An uploaded document: raw bytes plus a file name, identified by upload event.
///
/// Identity is assigned per upload, not derived from content: re-uploading
/// byte-identical bytes produces a new identity and is treated as a new
/// document.
#[derive(Clone, Debug)]
pub struct DocumentUpload {
    /// Identity of this upload event.
    pub id: Uuid,
    /// File name reported by the uploader.
    pub file_name: String,
    /// Raw PDF bytes.
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    /// Register a new upload, assigning it a fresh identity.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// One query/response pair in the conversation history.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Exchange {
    /// Query text as submitted.
    pub query: String,
    /// Response text, stored without emphasis markup.
    pub response: String,
    /// RFC3339 timestamp of when the query was answered.
    pub asked_at: String,
}

/// Per-session mutable state owned by the workflow controller.
///
/// Created when a session starts and discarded when it ends; never shared
/// across sessions.
pub struct SessionState {
    /// Identity of the most recently ingested upload. Never cleared.
    pub(crate) loaded_document: Option<Uuid>,
    /// Retrieval engine for the loaded document; set only by successful ingestion.
    pub(crate) query_engine: Option<Box<dyn QueryEngine>>,
    /// Append-only conversation history in chronological order.
    pub(crate) history: Vec<Exchange>,
}

impl SessionState {
    /// Fresh state with no ingested document and empty history.
    pub fn new() -> Self {
        Self {
            loaded_document: None,
            query_engine: None,
            history: Vec::new(),
        }
    }

    /// Whether a document has been successfully ingested.
    pub fn is_ingested(&self) -> bool {
        self.query_engine.is_some()
    }

    /// Conversation history, oldest first.
    pub fn history(&self) -> &[Exchange] {
        &self.history
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of a completed (or skipped) ingestion.
#[derive(Debug, Clone, Copy)]
pub struct IngestOutcome {
    /// True when the upload was already ingested and nothing was done.
    pub reused: bool,
    /// Number of chunks indexed (zero when reused).
    pub chunk_count: usize,
    /// Chunks skipped within the document due to duplicate content.
    pub skipped_duplicates: usize,
}

/// Result of a successfully answered query.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// Response text with every occurrence of the query emphasized.
    pub response: String,
    /// Full conversation history including this exchange.
    pub history: Vec<Exchange>,
}

/// Errors emitted while ingesting a document.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The document could not be staged to a temporary file.
    #[error("Failed to stage document: {0}")]
    Staging(#[from] std::io::Error),
    /// The parse collaborator rejected or failed on the document.
    #[error("Failed to parse document: {0}")]
    Parse(#[from] ParseError),
    /// Parsing yielded no usable chunks.
    #[error("Document produced no indexable content")]
    EmptyDocument,
    /// Embedding the parsed chunks failed.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingError),
    /// The vector index could not be assembled.
    #[error("Failed to build retrieval index: {0}")]
    Index(#[from] IndexError),
}

/// Errors emitted while answering a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The query text was empty or all whitespace.
    #[error("Query must not be empty")]
    EmptyQuery,
    /// No document has been successfully ingested yet.
    #[error("No document has been ingested for this session")]
    NotIngested,
    /// The retrieval engine failed to produce a response.
    #[error("Failed to answer query: {0}")]
    Engine(#[from] QueryEngineError),
}

/// Errors emitted while summarizing a document.
#[derive(Debug, Error)]
pub enum SummarizeError {
    /// No completion API key was supplied.
    #[error("Missing completion API key")]
    MissingApiKey,
    /// Plain-text extraction from the PDF failed.
    #[error("Failed to extract document text: {0}")]
    Extraction(#[from] PdfError),
    /// The document contains no extractable text.
    #[error("Document contains no extractable text")]
    EmptyDocument,
    /// The completion API failed to produce a summary.
    #[error("Failed to generate summary: {0}")]
    Completion(#[from] CompletionError),
}

/// Current UTC timestamp rendered as RFC3339.
pub(crate) fn current_timestamp_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .expect("RFC3339 formatting of the current time")
}
