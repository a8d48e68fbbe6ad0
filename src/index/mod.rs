//! Retrieval engine construction: chunk preparation, the in-memory vector
//! index, and the query engine that answers against it.

mod engine;
mod store;

pub use engine::{
    QueryEngine, QueryEngineError, QueryResponse, RetrievalEngine, RetrievalEngineParams,
};
pub use store::{
    IndexError, PreparedChunk, ScoredChunk, VectorIndex, compute_chunk_hash, dedupe_chunks,
};
