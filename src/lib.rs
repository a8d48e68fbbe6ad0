#![deny(missing_docs)]

//! Core library for the docuchat document question-answering service.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// In-memory vector index and retrieval engine.
pub mod index;
/// Chat-completion client abstraction and adapters.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Usage metrics helpers.
pub mod metrics;
/// Hosted document parsing/chunking client.
pub mod parse;
/// PDF text extraction helpers.
pub mod pdf;
/// Session workflow controller.
pub mod session;
