//! The query engine produced by ingestion.
//!
//! `RetrievalEngine` answers a question in three steps: embed the query,
//! rank the document's chunks by cosine similarity, and hand the best
//! excerpts to the completion API for answer synthesis.

use crate::embedding::{EmbeddingClient, EmbeddingError};
use crate::index::store::{ScoredChunk, VectorIndex};
use crate::llm::{ChatMessage, CompletionClient, CompletionError, CompletionRequest};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;

const ANSWER_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that answers questions using only the provided document excerpts. \
     If the excerpts do not contain the answer, say so.";
const ANSWER_MAX_TOKENS: u32 = 512;
const ANSWER_TEMPERATURE: f32 = 0.1;

/// Errors raised while answering a query through a retrieval engine.
#[derive(Debug, Error)]
pub enum QueryEngineError {
    /// Embedding the query text failed.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Answer synthesis through the completion API failed.
    #[error("Failed to synthesize answer: {0}")]
    Completion(#[from] CompletionError),
    /// Embedding provider returned no vectors.
    #[error("Embedding provider returned no vectors for the query")]
    EmptyEmbedding,
    /// Returned embedding dimension does not match the index.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the index vectors.
        expected: usize,
        /// Dimension produced for the query.
        actual: usize,
    },
}

/// Response produced by a query engine.
///
/// Engines differ in what they can report: the bundled retrieval engine
/// yields a structured answer, while simpler backends may only produce a
/// string rendering. Both shapes normalize through [`QueryResponse::into_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResponse {
    /// Structured answer with dedicated response text.
    Answer {
        /// Synthesized answer text.
        text: String,
    },
    /// Plain string rendering from an engine without structured output.
    Raw(String),
}

impl QueryResponse {
    /// Normalize either response shape to plain text.
    pub fn into_text(self) -> String {
        match self {
            Self::Answer { text } => text,
            Self::Raw(text) => text,
        }
    }
}

/// Interface implemented by query-capable engines.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Answer a natural-language query against the ingested content.
    async fn query(&self, text: &str) -> Result<QueryResponse, QueryEngineError>;
}

/// Collaborators and tuning shared by every engine a service builds.
#[derive(Clone)]
pub struct RetrievalEngineParams {
    /// Embedding backend used for query vectors.
    pub embeddings: Arc<dyn EmbeddingClient>,
    /// Completion backend used for answer synthesis.
    pub completions: Arc<dyn CompletionClient>,
    /// Chat model used for answer synthesis.
    pub completion_model: String,
    /// Number of chunks supplied as context.
    pub top_k: usize,
}

/// Query engine over one document's in-memory vector index.
pub struct RetrievalEngine {
    index: VectorIndex,
    api_key: String,
    params: RetrievalEngineParams,
}

impl RetrievalEngine {
    /// Wrap a built index together with the collaborators needed to query it.
    pub fn new(index: VectorIndex, api_key: String, params: RetrievalEngineParams) -> Self {
        Self {
            index,
            api_key,
            params,
        }
    }

    /// Number of indexed chunks.
    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }
}

#[async_trait]
impl QueryEngine for RetrievalEngine {
    async fn query(&self, text: &str) -> Result<QueryResponse, QueryEngineError> {
        let mut vectors = self
            .params
            .embeddings
            .embed(&self.api_key, vec![text.to_string()])
            .await?;
        let vector = vectors.pop().ok_or(QueryEngineError::EmptyEmbedding)?;

        let expected = self.index.dimension();
        if vector.len() != expected {
            return Err(QueryEngineError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let context = self.index.top_k(&vector, self.params.top_k);
        tracing::debug!(
            excerpts = context.len(),
            top_score = context.first().map(|hit| hit.score),
            "Retrieved context for query"
        );

        let request = CompletionRequest {
            model: self.params.completion_model.clone(),
            messages: vec![
                ChatMessage::system(ANSWER_SYSTEM_PROMPT),
                ChatMessage::user(build_answer_prompt(text, &context)),
            ],
            max_tokens: ANSWER_MAX_TOKENS,
            temperature: ANSWER_TEMPERATURE,
        };

        let answer = self
            .params
            .completions
            .complete(&self.api_key, request)
            .await?;

        Ok(QueryResponse::Answer {
            text: answer.trim().to_string(),
        })
    }
}

fn build_answer_prompt(query: &str, context: &[ScoredChunk]) -> String {
    let mut prompt = String::from("Document excerpts:\n\n");
    for (idx, hit) in context.iter().enumerate() {
        let _ = writeln!(prompt, "[{}] {}\n", idx + 1, hit.text.trim());
    }
    let _ = write!(prompt, "Question: {query}");
    prompt
}
