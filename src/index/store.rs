//! In-memory vector store backing one session's retrieval engine.
//!
//! Each ingested document gets a fresh index that lives exactly as long as
//! the session keeps it, so there is no external store to reconcile with:
//! chunks are deduplicated, embedded, and held alongside their vectors.

use crate::parse::DocumentChunk;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use thiserror::Error;

/// Errors raised while assembling a vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Chunk and vector counts differ after embedding.
    #[error("chunk and vector counts differ: {chunks} chunks, {vectors} vectors")]
    CountMismatch {
        /// Number of prepared chunks.
        chunks: usize,
        /// Number of embedding vectors.
        vectors: usize,
    },
    /// Vectors of differing dimension were supplied.
    #[error("inconsistent vector dimensions: expected {expected}, got {actual}")]
    InconsistentDimensions {
        /// Dimension of the first vector.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// The document produced no indexable chunks.
    #[error("cannot build an index with no chunks")]
    Empty,
}

/// Chunk text with its content digest, ready for embedding.
#[derive(Debug, Clone)]
pub struct PreparedChunk {
    /// Chunk text content.
    pub text: String,
    /// Stable digest used for in-document dedupe.
    pub chunk_hash: String,
}

/// Compute the stable content digest for a chunk.
pub fn compute_chunk_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(digest)
}

/// Drop blank and duplicate chunks, keeping the first occurrence of each.
///
/// Duplicate detection is by content digest and applies only within one
/// document; re-ingesting a different upload starts from scratch.
pub fn dedupe_chunks(chunks: Vec<DocumentChunk>) -> (Vec<PreparedChunk>, usize) {
    let mut seen = HashSet::new();
    let mut prepared = Vec::new();
    let mut skipped = 0;

    for chunk in chunks {
        if chunk.text.trim().is_empty() {
            continue;
        }
        let hash = compute_chunk_hash(&chunk.text);
        if seen.insert(hash.clone()) {
            prepared.push(PreparedChunk {
                text: chunk.text,
                chunk_hash: hash,
            });
        } else {
            skipped += 1;
        }
    }

    (prepared, skipped)
}

#[derive(Debug)]
struct IndexEntry {
    text: String,
    vector: Vec<f32>,
}

/// Immutable vector index over one document's chunks.
#[derive(Debug)]
pub struct VectorIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
}

/// One retrieval hit: chunk text plus its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Chunk text content.
    pub text: String,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

impl VectorIndex {
    /// Assemble an index from prepared chunks and their embedding vectors.
    pub fn build(chunks: Vec<PreparedChunk>, vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::Empty);
        }
        if chunks.len() != vectors.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }

        let dimension = vectors[0].len();
        for vector in &vectors {
            if vector.len() != dimension {
                return Err(IndexError::InconsistentDimensions {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry {
                text: chunk.text,
                vector,
            })
            .collect();

        Ok(Self { dimension, entries })
    }

    /// Dimensionality of the stored vectors.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the `k` chunks most similar to the query vector, best first.
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                text: entry.text.clone(),
                score: cosine_similarity(&entry.vector, query),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
