//! Core data models shared by the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RagError;

/// Where a document's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Url,
    Text,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Url => "url",
            DocumentKind::Text => "text",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(DocumentKind::Pdf),
            "url" => Ok(DocumentKind::Url),
            "text" => Ok(DocumentKind::Text),
            other => Err(RagError::InvalidInput(format!(
                "unknown document type '{}': expected pdf, url, or text",
                other
            ))),
        }
    }
}

/// An ingested document. Never mutated after creation; re-ingesting the
/// same source produces a new document with a fresh id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// UUID assigned at ingestion.
    pub id: String,
    /// File name or URL the text came from.
    pub source: String,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    /// Unix timestamp (seconds).
    pub created_at: i64,
    /// Length of the ingested text in characters.
    pub char_count: usize,
    /// Number of chunks that were embedded and stored.
    pub chunk_count: usize,
}

/// A bounded slice of a document's text together with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `{document_id}_chunk_{chunk_index}`.
    pub id: String,
    pub document_id: String,
    /// Copied from the owning document for source-label lookup.
    pub source: String,
    /// Position within the document, starting at 0.
    pub chunk_index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A chunk returned by similarity search together with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// Build the deterministic chunk id for a document position.
pub fn chunk_id(document_id: &str, chunk_index: usize) -> String {
    format!("{}_chunk_{}", document_id, chunk_index)
}
