//! HTTP surface for docuchat.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /sessions` – Open a session from user-supplied API credentials.
//! - `POST /sessions/:id/document` – Upload a PDF (raw body) and receive a
//!   first-pages preview.
//! - `POST /sessions/:id/query` – Ingest the upload if needed, answer the
//!   query, and return the emphasized response plus the full history.
//! - `POST /sessions/:id/summarize` – Summarize the uploaded document with a
//!   single completion call, independent of ingestion state.
//! - `GET /sessions/:id/history` – Chronological conversation history.
//! - `GET /metrics` – Usage counters.
//! - `GET /commands` – Machine-readable command catalog for discovery.
//!
//! One interaction per session runs at a time: each session sits behind an
//! async mutex, so a second request on the same session waits for the first
//! to finish. Sessions are independent of each other.

use crate::metrics::MetricsSnapshot;
use crate::pdf::PdfError;
use crate::session::{
    Credentials, DocumentUpload, Exchange, IngestError, QueryError, SessionApi, SessionState,
    SummarizeError,
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

const MISSING_FIELDS_MESSAGE: &str = "Please provide the missing fields.";
const UPLOAD_PROMPT_MESSAGE: &str = "Please upload the source document.";
const SUMMARIZE_KEY_MESSAGE: &str = "Please provide a completion API key.";
const SUMMARIZE_UPLOAD_MESSAGE: &str = "Please upload a document to summarize.";

/// Shared router state: the workflow service plus the live session registry.
struct AppState<S> {
    service: Arc<S>,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<SessionEntry>>>>,
}

/// Everything one user session owns.
struct SessionEntry {
    credentials: Credentials,
    upload: Option<DocumentUpload>,
    state: SessionState,
}

/// Build the HTTP router exposing the session workflow.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: SessionApi + 'static,
{
    let state = Arc::new(AppState {
        service,
        sessions: RwLock::new(HashMap::new()),
    });
    Router::new()
        .route("/sessions", post(create_session::<S>))
        .route("/sessions/:session_id/document", post(upload_document::<S>))
        .route("/sessions/:session_id/query", post(submit_query::<S>))
        .route(
            "/sessions/:session_id/summarize",
            post(summarize_document::<S>),
        )
        .route("/sessions/:session_id/history", get(get_history::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(state)
}

/// Request body for `POST /sessions`.
#[derive(Deserialize)]
struct CreateSessionRequest {
    /// Key for the completion/embedding API (masked input on the client).
    completion_api_key: String,
    /// Key for the hosted parse service.
    parse_api_key: String,
}

/// Success response for `POST /sessions`.
#[derive(Serialize)]
struct CreateSessionResponse {
    session_id: Uuid,
}

/// Open a new session holding the supplied credentials.
async fn create_session<S>(
    State(app): State<Arc<AppState<S>>>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError>
where
    S: SessionApi,
{
    let credentials = Credentials {
        completion_api_key: request.completion_api_key,
        parse_api_key: request.parse_api_key,
    };
    if !credentials.is_complete() {
        return Err(AppError::Validation(MISSING_FIELDS_MESSAGE));
    }

    let session_id = Uuid::new_v4();
    let entry = SessionEntry {
        credentials,
        upload: None,
        state: SessionState::new(),
    };
    app.sessions
        .write()
        .await
        .insert(session_id, Arc::new(Mutex::new(entry)));
    tracing::info!(%session_id, "Session created");

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse { session_id }),
    ))
}

/// Query parameters for `POST /sessions/:id/document`.
#[derive(Deserialize)]
struct UploadParams {
    /// File name reported by the uploader.
    #[serde(default)]
    file_name: Option<String>,
}

/// Success response for `POST /sessions/:id/document`.
#[derive(Serialize)]
struct UploadResponse {
    document_id: Uuid,
    file_name: String,
    /// Text of the first pages, for display next to the upload control.
    preview: String,
}

/// Store an uploaded PDF in the session and return its preview.
///
/// The upload replaces any previous one but is not ingested yet; ingestion
/// happens lazily on the first query against it.
async fn upload_document<S>(
    State(app): State<Arc<AppState<S>>>,
    Path(session_id): Path<Uuid>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError>
where
    S: SessionApi,
{
    let entry = lookup_session(&app, session_id).await?;
    let mut entry = entry.lock().await;

    if body.is_empty() {
        return Err(AppError::Validation(UPLOAD_PROMPT_MESSAGE));
    }

    let file_name = params.file_name.unwrap_or_else(|| "upload.pdf".to_string());
    let document = DocumentUpload::new(file_name, body.to_vec());
    // Rejects non-PDF payloads before the upload is accepted.
    let preview = app.service.preview(&document)?;
    tracing::info!(
        %session_id,
        file_name = %document.file_name,
        size_bytes = document.bytes.len(),
        "Document uploaded"
    );

    let response = UploadResponse {
        document_id: document.id,
        file_name: document.file_name.clone(),
        preview,
    };
    entry.upload = Some(document);
    Ok(Json(response))
}

/// Request body for `POST /sessions/:id/query`.
#[derive(Deserialize)]
struct QueryRequest {
    query: String,
}

/// Success response for `POST /sessions/:id/query`.
#[derive(Serialize)]
struct QueryResponseBody {
    /// Response text with every occurrence of the query emphasized.
    response: String,
    /// Full conversation history, oldest first.
    history: Vec<Exchange>,
}

/// Answer a query, ingesting the uploaded document first when necessary.
async fn submit_query<S>(
    State(app): State<Arc<AppState<S>>>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponseBody>, AppError>
where
    S: SessionApi,
{
    let entry = lookup_session(&app, session_id).await?;
    let mut entry = entry.lock().await;

    if !entry.credentials.is_complete() || request.query.trim().is_empty() {
        return Err(AppError::Validation(MISSING_FIELDS_MESSAGE));
    }
    let Some(document) = entry.upload.clone() else {
        return Err(AppError::Validation(UPLOAD_PROMPT_MESSAGE));
    };

    let credentials = entry.credentials.clone();
    app.service
        .ingest_if_needed(&mut entry.state, &document, &credentials)
        .await?;

    let outcome = app
        .service
        .answer_query(&mut entry.state, &request.query)
        .await?;

    Ok(Json(QueryResponseBody {
        response: outcome.response,
        history: outcome.history,
    }))
}

/// Success response for `POST /sessions/:id/summarize`.
#[derive(Serialize)]
struct SummarizeResponse {
    summary: String,
}

/// Summarize the uploaded document, independent of ingestion state.
async fn summarize_document<S>(
    State(app): State<Arc<AppState<S>>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SummarizeResponse>, AppError>
where
    S: SessionApi,
{
    let entry = lookup_session(&app, session_id).await?;
    let entry = entry.lock().await;

    if entry.credentials.completion_api_key.trim().is_empty() {
        return Err(AppError::Validation(SUMMARIZE_KEY_MESSAGE));
    }
    let Some(document) = entry.upload.as_ref() else {
        return Err(AppError::Validation(SUMMARIZE_UPLOAD_MESSAGE));
    };

    let summary = app
        .service
        .summarize(document, &entry.credentials)
        .await?;
    Ok(Json(SummarizeResponse { summary }))
}

/// Success response for `GET /sessions/:id/history`.
#[derive(Serialize)]
struct HistoryResponse {
    history: Vec<Exchange>,
}

/// Return the session's conversation history, oldest first.
async fn get_history<S>(
    State(app): State<Arc<AppState<S>>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<HistoryResponse>, AppError>
where
    S: SessionApi,
{
    let entry = lookup_session(&app, session_id).await?;
    let entry = entry.lock().await;
    Ok(Json(HistoryResponse {
        history: entry.state.history().to_vec(),
    }))
}

/// Return usage counters for observability.
async fn get_metrics<S>(State(app): State<Arc<AppState<S>>>) -> Json<MetricsSnapshot>
where
    S: SessionApi,
{
    Json(app.service.metrics_snapshot())
}

async fn lookup_session<S>(
    app: &AppState<S>,
    session_id: Uuid,
) -> Result<Arc<Mutex<SessionEntry>>, AppError> {
    app.sessions
        .read()
        .await
        .get(&session_id)
        .cloned()
        .ok_or(AppError::SessionNotFound)
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "create_session",
                method: "POST",
                path: "/sessions",
                description: "Open a session from API credentials. Response returns { \"session_id\": uuid }.",
                request_example: Some(json!({
                    "completion_api_key": "sk-...",
                    "parse_api_key": "px-..."
                })),
            },
            CommandDescriptor {
                name: "upload_document",
                method: "POST",
                path: "/sessions/{session_id}/document?file_name=report.pdf",
                description: "Upload a PDF as the raw request body; returns the upload id and a first-pages preview.",
                request_example: None,
            },
            CommandDescriptor {
                name: "query",
                method: "POST",
                path: "/sessions/{session_id}/query",
                description: "Ingest the upload if needed and answer a question against it. Occurrences of the query in the response are wrapped in an emphasis marker.",
                request_example: Some(json!({ "query": "What is the warranty period?" })),
            },
            CommandDescriptor {
                name: "summarize",
                method: "POST",
                path: "/sessions/{session_id}/summarize",
                description: "Generate a concise summary of the uploaded document with a single completion call.",
                request_example: None,
            },
            CommandDescriptor {
                name: "history",
                method: "GET",
                path: "/sessions/{session_id}/history",
                description: "Return the session's conversation history in chronological order.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return usage counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    Validation(&'static str),
    SessionNotFound,
    Preview(PdfError),
    Ingest(IngestError),
    Query(QueryError),
    Summarize(SummarizeError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Validation(message) => (StatusCode::UNPROCESSABLE_ENTITY, message.to_string()),
            Self::SessionNotFound => (StatusCode::NOT_FOUND, "Session not found".to_string()),
            Self::Preview(error) => (StatusCode::UNPROCESSABLE_ENTITY, error.to_string()),
            Self::Query(error @ (QueryError::EmptyQuery | QueryError::NotIngested)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, error.to_string())
            }
            Self::Summarize(error @ SummarizeError::MissingApiKey) => {
                (StatusCode::UNPROCESSABLE_ENTITY, error.to_string())
            }
            Self::Ingest(error) => (StatusCode::BAD_GATEWAY, error.to_string()),
            Self::Query(error) => (StatusCode::BAD_GATEWAY, error.to_string()),
            Self::Summarize(error) => (StatusCode::BAD_GATEWAY, error.to_string()),
        };
        (status, message).into_response()
    }
}

impl From<PdfError> for AppError {
    fn from(inner: PdfError) -> Self {
        Self::Preview(inner)
    }
}

impl From<IngestError> for AppError {
    fn from(inner: IngestError) -> Self {
        Self::Ingest(inner)
    }
}

impl From<QueryError> for AppError {
    fn from(inner: QueryError) -> Self {
        Self::Query(inner)
    }
}

impl From<SummarizeError> for AppError {
    fn from(inner: SummarizeError) -> Self {
        Self::Summarize(inner)
    }
}
