//! Crate-wide error types.
//!
//! Each stage owns a narrow error enum; [`RagError`] composes them at the
//! pipeline boundary via `#[from]` so callers can match on stage without the
//! pipeline itself needing to know every leaf variant.

use thiserror::Error;

/// Errors surfaced while chunking, enriching, or indexing a document.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("pdf extraction failed: {0}")]
    Extraction(String),

    #[error("chunking failed: {0}")]
    Chunking(String),

    #[error("metadata enrichment failed: {0}")]
    Enrichment(String),

    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("vector store error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Errors surfaced while loading, mutating, or persisting session state.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session persistence failed: {0}")]
    Persistence(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Errors surfaced while rewriting, parsing filters, or expanding a query.
#[derive(Debug, Error)]
pub enum QueryUnderstandingError {
    #[error("context-aware rewrite failed: {0}")]
    Rewrite(String),

    #[error("entity extraction failed: {0}")]
    EntityExtraction(String),

    #[error("self-query parse failed: {0}")]
    SelfQuery(String),

    #[error("query expansion failed: {0}")]
    Expansion(String),
}

/// Errors surfaced while retrieving candidate chunks.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("vector store query failed: {0}")]
    Store(String),

    #[error("embedding request failed: {0}")]
    Embedding(String),
}

/// Errors surfaced while synthesizing the final answer.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("chat completion failed: {0}")]
    Completion(String),
}

/// A stage call exceeded its configured deadline (see `PipelineConfig::timeouts`).
#[derive(Debug, Error)]
#[error("stage '{stage}' exceeded its {budget_ms}ms deadline")]
pub struct StageTimeout {
    pub stage: &'static str,
    pub budget_ms: u64,
}

/// Top-level crate error. Most stages are designed to *degrade* rather than
/// propagate; this type exists for the cases where a failure genuinely has
/// to halt the request — a commit-time persistence failure, or a
/// caller-facing configuration error.
#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    QueryUnderstanding(#[from] QueryUnderstandingError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Timeout(#[from] StageTimeout),

    #[error("invalid configuration: {0}")]
    Config(String),
}
