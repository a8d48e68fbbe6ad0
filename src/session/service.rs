//! Session workflow controller coordinating ingestion, retrieval, and summarization.

use crate::embedding::EmbeddingClient;
use crate::index::{RetrievalEngine, RetrievalEngineParams, VectorIndex, dedupe_chunks};
use crate::llm::{ChatMessage, CompletionClient, CompletionRequest};
use crate::metrics::{MetricsSnapshot, UsageMetrics};
use crate::parse::{ChunkParser, ParseOptions};
use crate::pdf::{self, PdfError};
use crate::session::highlight::emphasize_occurrences;
use crate::session::types::{
    Credentials, DocumentUpload, Exchange, IngestError, IngestOutcome, QueryError, QueryOutcome,
    SessionState, SummarizeError, current_timestamp_rfc3339,
};
use async_trait::async_trait;
use std::io::Write as _;
use std::sync::Arc;

const SUMMARY_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that creates concise, accurate summaries of documents.";
const SUMMARY_USER_PREFIX: &str =
    "Please provide a comprehensive summary of the following document:\n\n";
/// Character budget applied to summarization input before submission.
pub const SUMMARY_INPUT_CHAR_BUDGET: usize = 14_000;
/// Marker appended when summarization input exceeds the character budget.
pub const TRUNCATION_MARKER: &str = "...";
const SUMMARY_MAX_TOKENS: u32 = 500;
const SUMMARY_TEMPERATURE: f32 = 0.5;

/// Coordinates the session workflow: ingestion, query answering, and summaries.
///
/// The service owns long-lived handles to the parse, embedding, and completion
/// collaborators plus the metrics registry, and is shared by every session.
/// Per-session mutable state lives in [`SessionState`] and is passed into each
/// operation, so the service itself never holds session data.
pub struct SessionService {
    parser: Arc<dyn ChunkParser>,
    embeddings: Arc<dyn EmbeddingClient>,
    completions: Arc<dyn CompletionClient>,
    metrics: Arc<UsageMetrics>,
    parse_options: ParseOptions,
    completion_model: String,
    retrieval_top_k: usize,
}

/// Abstraction over the session workflow used by external surfaces.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Ingest the upload unless it is the one already loaded for this state.
    async fn ingest_if_needed(
        &self,
        state: &mut SessionState,
        document: &DocumentUpload,
        credentials: &Credentials,
    ) -> Result<IngestOutcome, IngestError>;

    /// Answer a query against the ingested document and record the exchange.
    async fn answer_query(
        &self,
        state: &mut SessionState,
        query: &str,
    ) -> Result<QueryOutcome, QueryError>;

    /// Summarize a document independently of ingestion state.
    async fn summarize(
        &self,
        document: &DocumentUpload,
        credentials: &Credentials,
    ) -> Result<String, SummarizeError>;

    /// Extract the upload preview (first pages of text).
    fn preview(&self, document: &DocumentUpload) -> Result<String, PdfError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl SessionService {
    /// Build a service from explicit collaborators.
    pub fn new(
        parser: Arc<dyn ChunkParser>,
        embeddings: Arc<dyn EmbeddingClient>,
        completions: Arc<dyn CompletionClient>,
        parse_options: ParseOptions,
        completion_model: String,
        retrieval_top_k: usize,
    ) -> Self {
        Self {
            parser,
            embeddings,
            completions,
            metrics: Arc::new(UsageMetrics::new()),
            parse_options,
            completion_model,
            retrieval_top_k,
        }
    }

    /// Build a service wired to the HTTP collaborators named in configuration.
    pub fn from_config() -> Self {
        let config = crate::config::get_config();
        tracing::info!(
            parse_service_url = %config.parse_service_url,
            llm_base_url = %config.llm_base_url,
            "Initializing session service"
        );
        Self::new(
            Arc::new(crate::parse::ParseServiceClient::new(
                config.parse_service_url.clone(),
            )),
            Arc::from(crate::embedding::embedding_client_from_config(config)),
            Arc::new(crate::llm::OpenAiCompletionClient::new(
                config.llm_base_url.clone(),
            )),
            ParseOptions {
                language: config.parse_language.clone(),
                result_format: crate::parse::ResultFormat::Markdown,
            },
            config.completion_model.clone(),
            config.retrieval_top_k,
        )
    }

    /// Ingest `document` unless it is already the loaded one.
    ///
    /// The upload is staged to a temporary file for the parse collaborator;
    /// the file is deleted when staging goes out of scope, parse failure
    /// included. Session state is only committed after every step succeeds,
    /// so a failed ingestion leaves the previous engine usable.
    pub async fn ingest_if_needed(
        &self,
        state: &mut SessionState,
        document: &DocumentUpload,
        credentials: &Credentials,
    ) -> Result<IngestOutcome, IngestError> {
        if state.loaded_document == Some(document.id) {
            tracing::debug!(file_name = %document.file_name, "Upload already ingested; skipping");
            return Ok(IngestOutcome {
                reused: true,
                chunk_count: 0,
                skipped_duplicates: 0,
            });
        }

        tracing::info!(
            file_name = %document.file_name,
            size_bytes = document.bytes.len(),
            "Ingesting uploaded document"
        );

        let chunks = {
            let staged = stage_document(&document.bytes)?;
            self.parser
                .parse_file(&credentials.parse_api_key, staged.path(), &self.parse_options)
                .await?
        };
        tracing::debug!(chunks = chunks.len(), "Parsed document chunks");

        let (prepared, skipped_duplicates) = dedupe_chunks(chunks);
        if prepared.is_empty() {
            return Err(IngestError::EmptyDocument);
        }

        let texts: Vec<String> = prepared.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self
            .embeddings
            .embed(&credentials.completion_api_key, texts)
            .await?;

        let index = VectorIndex::build(prepared, embeddings)?;
        let chunk_count = index.len();
        let engine = RetrievalEngine::new(
            index,
            credentials.completion_api_key.clone(),
            RetrievalEngineParams {
                embeddings: self.embeddings.clone(),
                completions: self.completions.clone(),
                completion_model: self.completion_model.clone(),
                top_k: self.retrieval_top_k,
            },
        );

        state.query_engine = Some(Box::new(engine));
        state.loaded_document = Some(document.id);
        self.metrics.record_ingestion(chunk_count as u64);
        tracing::info!(
            file_name = %document.file_name,
            chunks = chunk_count,
            skipped_duplicates,
            "Document indexed"
        );

        Ok(IngestOutcome {
            reused: false,
            chunk_count,
            skipped_duplicates,
        })
    }

    /// Answer `query` against the ingested document.
    ///
    /// On success the raw response is appended to the history and returned
    /// with every literal occurrence of the query emphasized. On failure the
    /// history is left untouched.
    pub async fn answer_query(
        &self,
        state: &mut SessionState,
        query: &str,
    ) -> Result<QueryOutcome, QueryError> {
        if query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        let engine = state.query_engine.as_ref().ok_or(QueryError::NotIngested)?;

        let response = engine.query(query).await?.into_text();

        state.history.push(Exchange {
            query: query.to_string(),
            response: response.clone(),
            asked_at: current_timestamp_rfc3339(),
        });
        self.metrics.record_query();
        tracing::debug!(history_len = state.history.len(), "Query answered");

        Ok(QueryOutcome {
            response: emphasize_occurrences(&response, query),
            history: state.history.clone(),
        })
    }

    /// Summarize `document` with a single completion call.
    ///
    /// Independent of ingestion state: the text comes straight from the PDF
    /// bytes, not from the chunked parse used for retrieval. Input beyond
    /// [`SUMMARY_INPUT_CHAR_BUDGET`] characters is truncated with
    /// [`TRUNCATION_MARKER`] appended.
    pub async fn summarize(
        &self,
        document: &DocumentUpload,
        credentials: &Credentials,
    ) -> Result<String, SummarizeError> {
        if credentials.completion_api_key.trim().is_empty() {
            return Err(SummarizeError::MissingApiKey);
        }

        let text = pdf::full_text(&document.bytes)?;
        if text.trim().is_empty() {
            return Err(SummarizeError::EmptyDocument);
        }

        let body = truncate_to_budget(&text, SUMMARY_INPUT_CHAR_BUDGET);
        let request = CompletionRequest {
            model: self.completion_model.clone(),
            messages: vec![
                ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
                ChatMessage::user(format!("{SUMMARY_USER_PREFIX}{body}")),
            ],
            max_tokens: SUMMARY_MAX_TOKENS,
            temperature: SUMMARY_TEMPERATURE,
        };

        let summary = self
            .completions
            .complete(&credentials.completion_api_key, request)
            .await?;
        self.metrics.record_summary();
        tracing::info!(file_name = %document.file_name, "Summary generated");

        Ok(summary.trim().to_string())
    }

    /// Extract the upload preview: text of the first pages.
    pub fn preview(&self, document: &DocumentUpload) -> Result<String, PdfError> {
        pdf::preview_text(&document.bytes)
    }

    /// Return the current usage metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl SessionApi for SessionService {
    async fn ingest_if_needed(
        &self,
        state: &mut SessionState,
        document: &DocumentUpload,
        credentials: &Credentials,
    ) -> Result<IngestOutcome, IngestError> {
        SessionService::ingest_if_needed(self, state, document, credentials).await
    }

    async fn answer_query(
        &self,
        state: &mut SessionState,
        query: &str,
    ) -> Result<QueryOutcome, QueryError> {
        SessionService::answer_query(self, state, query).await
    }

    async fn summarize(
        &self,
        document: &DocumentUpload,
        credentials: &Credentials,
    ) -> Result<String, SummarizeError> {
        SessionService::summarize(self, document, credentials).await
    }

    fn preview(&self, document: &DocumentUpload) -> Result<String, PdfError> {
        SessionService::preview(self, document)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        SessionService::metrics_snapshot(self)
    }
}

/// Write the upload to a scoped temporary `.pdf` file for the parse service.
fn stage_document(bytes: &[u8]) -> Result<tempfile::NamedTempFile, std::io::Error> {
    let mut staged = tempfile::Builder::new().suffix(".pdf").tempfile()?;
    staged.write_all(bytes)?;
    staged.flush()?;
    tracing::debug!(path = %staged.path().display(), "Staged upload for parsing");
    Ok(staged)
}

/// Cut `text` to at most `budget` characters, marking the cut when it happens.
fn truncate_to_budget(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((boundary, _)) => format!("{}{TRUNCATION_MARKER}", &text[..boundary]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbeddingClient;
    use crate::index::{QueryEngine, QueryEngineError, QueryResponse};
    use crate::llm::CompletionError;
    use crate::parse::{DocumentChunk, ParseError};
    use crate::pdf::test_support::sample_pdf;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    struct CountingParser {
        calls: AtomicUsize,
        chunks: Vec<&'static str>,
        fail: bool,
    }

    impl CountingParser {
        fn returning(chunks: Vec<&'static str>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                chunks,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                chunks: Vec::new(),
                fail: true,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChunkParser for CountingParser {
        async fn parse_file(
            &self,
            _api_key: &str,
            path: &Path,
            _options: &ParseOptions,
        ) -> Result<Vec<DocumentChunk>, ParseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // The staged file must exist while the collaborator runs.
            assert!(path.exists());
            if self.fail {
                return Err(ParseError::ParseFailed("synthetic failure".into()));
            }
            Ok(self
                .chunks
                .iter()
                .map(|text| DocumentChunk {
                    text: (*text).to_string(),
                    page: None,
                })
                .collect())
        }
    }

    struct RecordingCompletionClient {
        reply: String,
        fail: bool,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl RecordingCompletionClient {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                fail: false,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: String::new(),
                fail: true,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for RecordingCompletionClient {
        async fn complete(
            &self,
            _api_key: &str,
            request: CompletionRequest,
        ) -> Result<String, CompletionError> {
            if self.fail {
                return Err(CompletionError::GenerationFailed("synthetic failure".into()));
            }
            self.requests.lock().await.push(request);
            Ok(self.reply.clone())
        }
    }

    fn service_with(
        parser: Arc<CountingParser>,
        completions: Arc<RecordingCompletionClient>,
    ) -> SessionService {
        SessionService::new(
            parser,
            Arc::new(HashedEmbeddingClient::new(16)),
            completions,
            ParseOptions::default(),
            "gpt-3.5-turbo".into(),
            2,
        )
    }

    fn credentials() -> Credentials {
        Credentials {
            completion_api_key: "sk-test".into(),
            parse_api_key: "llx-test".into(),
        }
    }

    fn upload(file_name: &str) -> DocumentUpload {
        DocumentUpload::new(file_name, sample_pdf(&["page one text"]))
    }

    #[tokio::test]
    async fn reingesting_the_same_upload_is_a_no_op() {
        let parser = Arc::new(CountingParser::returning(vec!["alpha", "beta"]));
        let service = service_with(parser.clone(), Arc::new(RecordingCompletionClient::replying("ok")));
        let mut state = SessionState::new();
        let document = upload("report.pdf");

        let first = service
            .ingest_if_needed(&mut state, &document, &credentials())
            .await
            .expect("first ingestion");
        assert!(!first.reused);
        assert_eq!(first.chunk_count, 2);

        let second = service
            .ingest_if_needed(&mut state, &document, &credentials())
            .await
            .expect("second ingestion");
        assert!(second.reused);
        assert_eq!(parser.call_count(), 1);
        assert_eq!(service.metrics_snapshot().documents_ingested, 1);
    }

    #[tokio::test]
    async fn identical_bytes_under_a_new_upload_reingest() {
        let parser = Arc::new(CountingParser::returning(vec!["alpha"]));
        let service = service_with(parser.clone(), Arc::new(RecordingCompletionClient::replying("ok")));
        let mut state = SessionState::new();
        let bytes = sample_pdf(&["page one text"]);

        let first = DocumentUpload::new("report.pdf", bytes.clone());
        let second = DocumentUpload::new("report.pdf", bytes);
        service
            .ingest_if_needed(&mut state, &first, &credentials())
            .await
            .expect("first ingestion");
        service
            .ingest_if_needed(&mut state, &second, &credentials())
            .await
            .expect("second ingestion");

        assert_eq!(parser.call_count(), 2);
        assert_eq!(state.loaded_document, Some(second.id));
    }

    #[tokio::test]
    async fn failed_ingestion_leaves_state_untouched() {
        let parser = Arc::new(CountingParser::failing());
        let service = service_with(parser, Arc::new(RecordingCompletionClient::replying("ok")));
        let mut state = SessionState::new();

        let error = service
            .ingest_if_needed(&mut state, &upload("broken.pdf"), &credentials())
            .await
            .expect_err("parse failure");
        assert!(matches!(error, IngestError::Parse(_)));
        assert!(state.loaded_document.is_none());
        assert!(!state.is_ingested());
        assert_eq!(service.metrics_snapshot().documents_ingested, 0);
    }

    #[tokio::test]
    async fn answer_query_appends_exactly_one_history_entry() {
        let parser = Arc::new(CountingParser::returning(vec!["the warranty lasts two years"]));
        let completions = Arc::new(RecordingCompletionClient::replying(
            "The warranty covers two years.",
        ));
        let service = service_with(parser, completions);
        let mut state = SessionState::new();
        service
            .ingest_if_needed(&mut state, &upload("report.pdf"), &credentials())
            .await
            .expect("ingestion");

        let outcome = service
            .answer_query(&mut state, "warranty")
            .await
            .expect("answer");

        assert_eq!(state.history().len(), 1);
        let entry = &state.history()[0];
        assert_eq!(entry.query, "warranty");
        assert_eq!(entry.response, "The warranty covers two years.");
        // Displayed response is emphasized; stored response is not.
        assert!(outcome.response.contains("<mark"));
        assert!(!entry.response.contains("<mark"));
        assert_eq!(outcome.history, state.history());
    }

    #[tokio::test]
    async fn query_without_ingestion_fails_cleanly() {
        let service = service_with(
            Arc::new(CountingParser::returning(vec![])),
            Arc::new(RecordingCompletionClient::replying("ok")),
        );
        let mut state = SessionState::new();

        let error = service
            .answer_query(&mut state, "anything")
            .await
            .expect_err("no engine");
        assert!(matches!(error, QueryError::NotIngested));
        assert!(state.history().is_empty());
    }

    #[tokio::test]
    async fn empty_query_is_rejected_before_the_engine_runs() {
        let service = service_with(
            Arc::new(CountingParser::returning(vec![])),
            Arc::new(RecordingCompletionClient::replying("ok")),
        );
        let mut state = SessionState::new();

        let error = service
            .answer_query(&mut state, "   ")
            .await
            .expect_err("blank query");
        assert!(matches!(error, QueryError::EmptyQuery));
    }

    #[tokio::test]
    async fn failed_query_leaves_history_unchanged() {
        let parser = Arc::new(CountingParser::returning(vec!["alpha"]));
        let completions = Arc::new(RecordingCompletionClient::failing());
        let service = service_with(parser, completions);
        let mut state = SessionState::new();
        service
            .ingest_if_needed(&mut state, &upload("report.pdf"), &credentials())
            .await
            .expect("ingestion");

        let error = service
            .answer_query(&mut state, "alpha")
            .await
            .expect_err("engine failure");
        assert!(matches!(error, QueryError::Engine(_)));
        assert!(state.history().is_empty());
        assert!(state.is_ingested());
        assert_eq!(service.metrics_snapshot().queries_answered, 0);
    }

    #[tokio::test]
    async fn raw_engine_responses_normalize_to_text() {
        struct RawEngine;

        #[async_trait]
        impl QueryEngine for RawEngine {
            async fn query(&self, _text: &str) -> Result<QueryResponse, QueryEngineError> {
                Ok(QueryResponse::Raw("plain rendering".into()))
            }
        }

        let service = service_with(
            Arc::new(CountingParser::returning(vec![])),
            Arc::new(RecordingCompletionClient::replying("unused")),
        );
        let mut state = SessionState::new();
        state.query_engine = Some(Box::new(RawEngine));

        let outcome = service
            .answer_query(&mut state, "rendering")
            .await
            .expect("answer");
        assert_eq!(state.history()[0].response, "plain rendering");
        assert!(outcome.response.contains("<mark"));
    }

    #[tokio::test]
    async fn summarize_submits_fixed_prompt_and_sampling() {
        let completions = Arc::new(RecordingCompletionClient::replying("  A short summary.  "));
        let service = service_with(
            Arc::new(CountingParser::returning(vec![])),
            completions.clone(),
        );

        let summary = service
            .summarize(&upload("report.pdf"), &credentials())
            .await
            .expect("summary");
        assert_eq!(summary, "A short summary.");

        let requests = completions.requests.lock().await;
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.max_tokens, SUMMARY_MAX_TOKENS);
        assert_eq!(request.temperature, SUMMARY_TEMPERATURE);
        assert_eq!(request.messages[0].content, SUMMARY_SYSTEM_PROMPT);
        assert!(request.messages[1].content.starts_with(SUMMARY_USER_PREFIX));
        assert!(request.messages[1].content.contains("page one text"));
        assert_eq!(service.metrics_snapshot().summaries_generated, 1);
    }

    #[tokio::test]
    async fn summarize_requires_an_api_key() {
        let completions = Arc::new(RecordingCompletionClient::replying("unused"));
        let service = service_with(
            Arc::new(CountingParser::returning(vec![])),
            completions.clone(),
        );
        let credentials = Credentials {
            completion_api_key: "   ".into(),
            parse_api_key: "llx-test".into(),
        };

        let error = service
            .summarize(&upload("report.pdf"), &credentials)
            .await
            .expect_err("missing key");
        assert!(matches!(error, SummarizeError::MissingApiKey));
        assert!(completions.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn summarize_rejects_text_free_documents() {
        let service = service_with(
            Arc::new(CountingParser::returning(vec![])),
            Arc::new(RecordingCompletionClient::replying("unused")),
        );
        let document = DocumentUpload::new("blank.pdf", sample_pdf(&[""]));

        let error = service
            .summarize(&document, &credentials())
            .await
            .expect_err("no text");
        assert!(matches!(error, SummarizeError::EmptyDocument));
    }

    #[test]
    fn truncation_cuts_to_budget_and_appends_marker() {
        let text = "x".repeat(SUMMARY_INPUT_CHAR_BUDGET + 500);
        let truncated = truncate_to_budget(&text, SUMMARY_INPUT_CHAR_BUDGET);
        assert!(truncated.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            truncated.chars().count(),
            SUMMARY_INPUT_CHAR_BUDGET + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn truncation_passes_short_text_through() {
        assert_eq!(truncate_to_budget("short", SUMMARY_INPUT_CHAR_BUDGET), "short");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(10);
        let truncated = truncate_to_budget(&text, 4);
        assert_eq!(truncated, format!("{}{TRUNCATION_MARKER}", "é".repeat(4)));
    }
}
