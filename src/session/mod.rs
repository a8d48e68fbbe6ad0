//! Session workflow controller: per-session state and the
//! ingest → query → respond sequence, plus the independent summarization path.

mod highlight;
mod service;
mod types;

pub use highlight::{MARK_CLOSE, MARK_OPEN, emphasize_occurrences};
pub use service::{
    SUMMARY_INPUT_CHAR_BUDGET, SessionApi, SessionService, TRUNCATION_MARKER,
};
pub use types::{
    Credentials, DocumentUpload, Exchange, IngestError, IngestOutcome, QueryError, QueryOutcome,
    SessionState, SummarizeError,
};
