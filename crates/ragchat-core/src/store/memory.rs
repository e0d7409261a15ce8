//! In-memory [`VectorStore`] implementation.
//!
//! Chunks and the document index sit behind one `std::sync::RwLock`, so a
//! writer replaces or removes a whole batch while searches hold the read
//! side. Search is brute-force cosine similarity over every stored vector.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{Chunk, Document, SearchHit};

use super::{rank_hits, validate_chunks, VectorStore};

#[derive(Default)]
struct Inner {
    /// Insertion order; overwrites keep their original slot.
    chunks: Vec<Chunk>,
    /// chunk id -> position in `chunks`.
    positions: HashMap<String, usize>,
    docs: Vec<Document>,
}

impl Inner {
    fn reindex(&mut self) {
        self.positions = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
    }
}

/// In-memory store for tests, the `memory` backend, and ephemeral runs.
pub struct InMemoryStore {
    dims: usize,
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Number of chunks currently stored.
    pub fn chunk_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .chunks
            .len()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        validate_chunks(chunks, self.dims)?;
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for c in chunks {
            match inner.positions.get(&c.id).copied() {
                Some(pos) => inner.chunks[pos] = c.clone(),
                None => {
                    let pos = inner.chunks.len();
                    inner.positions.insert(c.id.clone(), pos);
                    inner.chunks.push(c.clone());
                }
            }
        }
        Ok(())
    }

    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if query_embedding.len() != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual: query_embedding.len(),
            });
        }
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<SearchHit> = inner
            .chunks
            .iter()
            .map(|c| SearchHit {
                score: cosine_similarity(query_embedding, &c.embedding),
                chunk: c.clone(),
            })
            .collect();
        drop(inner);
        rank_hits(&mut hits, top_k);
        Ok(hits)
    }

    async fn delete_by_document(&self, doc_id: &str) -> Result<usize> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = inner.chunks.len();
        inner.chunks.retain(|c| c.document_id != doc_id);
        let removed = before - inner.chunks.len();
        if removed > 0 {
            inner.reindex();
        }
        inner.docs.retain(|d| d.id != doc_id);
        Ok(removed)
    }

    async fn record_document(&self, doc: &Document) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match inner.docs.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) => *existing = doc.clone(),
            None => inner.docs.push(doc.clone()),
        }
        Ok(())
    }

    async fn get_document(&self, doc_id: &str) -> Result<Option<Document>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.docs.iter().find(|d| d.id == doc_id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.docs.clone())
    }
}
