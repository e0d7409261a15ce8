//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the single shared mutable index of the
//! pipeline. It is injected into the ingestor, retriever, and engine as
//! an `Arc<dyn VectorStore>` rather than reached through global state.
//!
//! # Concurrency contract
//!
//! [`upsert`](VectorStore::upsert) and
//! [`delete_by_document`](VectorStore::delete_by_document) must each be
//! atomic with respect to concurrent [`search`](VectorStore::search)
//! calls: a search observes either all or none of a batch or a delete.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert`](VectorStore::upsert) | Insert or overwrite chunks by id |
//! | [`search`](VectorStore::search) | Top-k cosine similarity search |
//! | [`delete_by_document`](VectorStore::delete_by_document) | Cascade delete a document |
//! | [`record_document`](VectorStore::record_document) | Add a document to the index |
//! | [`get_document`](VectorStore::get_document) | Look up one document |
//! | [`list_documents`](VectorStore::list_documents) | All documents, oldest first |

pub mod memory;

use async_trait::async_trait;

use crate::error::{RagError, Result};
use crate::models::{Chunk, Document, SearchHit};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Dimension every stored embedding must have.
    fn dims(&self) -> usize;

    /// Insert chunks, overwriting any chunk with the same id in place.
    ///
    /// The whole batch is validated before anything is written.
    async fn upsert(&self, chunks: &[Chunk]) -> Result<()>;

    /// Return up to `top_k` chunks by descending cosine similarity, ties
    /// broken by original insertion order. An empty store yields an empty
    /// result.
    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchHit>>;

    /// Remove a document and all of its chunks. Unknown ids are a no-op.
    ///
    /// Returns the number of chunks removed.
    async fn delete_by_document(&self, doc_id: &str) -> Result<usize>;

    /// Add a document to the document index.
    async fn record_document(&self, doc: &Document) -> Result<()>;

    /// Look up a document by id.
    async fn get_document(&self, doc_id: &str) -> Result<Option<Document>>;

    /// All documents currently present, in creation order.
    async fn list_documents(&self) -> Result<Vec<Document>>;
}

/// Check that every chunk carries a non-empty embedding of `dims` entries.
pub fn validate_chunks(chunks: &[Chunk], dims: usize) -> Result<()> {
    for c in chunks {
        if c.embedding.is_empty() || c.embedding.len() != dims {
            return Err(RagError::DimensionMismatch {
                expected: dims,
                actual: c.embedding.len(),
            });
        }
    }
    Ok(())
}

/// Sort hits by descending score. The sort is stable, so hits that arrive
/// in insertion order keep that order on ties.
pub fn rank_hits(hits: &mut Vec<SearchHit>, top_k: usize) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(top_k);
}
