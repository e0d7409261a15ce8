//! Error taxonomy for the RAG pipeline.
//!
//! Chunk-level embedding failures are recovered inside ingestion; every
//! other variant propagates to the caller with enough detail to show a
//! message.

use thiserror::Error;

/// Errors raised by the ingestion, retrieval, and generation pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RagError {
    /// The supplied text had nothing worth indexing.
    #[error("no ingestible content: {0}")]
    EmptyContent(String),

    /// Text extraction from an uploaded file failed.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Fetching or parsing a web page failed.
    #[error("scrape failed: {0}")]
    Scrape(String),

    /// The embedding backend was unreachable or rejected an input.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The language-model backend failed (timeout, quota, network).
    #[error("generation backend failed: {0}")]
    GenerationBackend(String),

    /// An explicit lookup referenced an unknown id.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller passed an argument outside the accepted range.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A vector did not match the store's configured dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Pipeline parameters that cannot work together at runtime.
    #[error("configuration error: {0}")]
    Config(String),

    /// The persistence layer underneath a vector store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    /// Short machine-readable code, used by HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::EmptyContent(_) => "empty_content",
            RagError::Extraction(_) => "extraction_failed",
            RagError::Scrape(_) => "scrape_failed",
            RagError::Embedding(_) => "embedding_failed",
            RagError::GenerationBackend(_) => "generation_failed",
            RagError::NotFound(_) => "not_found",
            RagError::InvalidInput(_) => "bad_request",
            RagError::DimensionMismatch { .. } => "dimension_mismatch",
            RagError::Config(_) => "config_error",
            RagError::Storage(_) => "internal",
        }
    }
}
