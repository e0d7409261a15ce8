//! Document ingestion pipeline.
//!
//! Turns raw text into a stored [`Document`]:
//!
//! ```text
//! raw text ─▶ reject empty ─▶ new doc_id ─▶ chunk ─▶ embed (batched)
//!          ─▶ upsert surviving chunks ─▶ record document
//! ```
//!
//! Embedding failures are isolated per chunk. A batch that fails is
//! retried one item at a time; items that still fail, or come back with
//! the wrong dimension, are dropped and counted. Ingestion fails only if
//! no chunk survives.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::chunk::{chunk_text, ChunkingParams};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::models::{chunk_id, Chunk, Document, DocumentKind};
use crate::store::VectorStore;

/// Ingestion tuning, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestParams {
    pub chunking: ChunkingParams,
    /// Trimmed text shorter than this is rejected as empty.
    pub min_content_chars: usize,
    /// Chunks embedded per backend call.
    pub batch_size: usize,
}

impl Default for IngestParams {
    fn default() -> Self {
        Self {
            chunking: ChunkingParams::default(),
            min_content_chars: 10,
            batch_size: 64,
        }
    }
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub document: Document,
    pub chunks_written: usize,
    /// Chunks dropped because embedding failed for them.
    pub chunks_failed: usize,
}

/// Orchestrates chunking, embedding, and storage for new sources.
#[derive(Clone)]
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    params: IngestParams,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        params: IngestParams,
    ) -> Result<Self> {
        params.chunking.validate()?;
        if params.batch_size == 0 {
            return Err(RagError::InvalidInput(
                "batch_size must be > 0".to_string(),
            ));
        }
        Ok(Self {
            embedder,
            store,
            params,
        })
    }

    pub fn params(&self) -> &IngestParams {
        &self.params
    }

    /// Ingest `raw_text` as a new document.
    ///
    /// Re-ingesting the same `source` always creates a distinct document.
    pub async fn ingest(
        &self,
        source: &str,
        kind: DocumentKind,
        raw_text: &str,
    ) -> Result<IngestReport> {
        let text = raw_text.trim();
        let char_count = text.chars().count();
        if char_count == 0 {
            return Err(RagError::EmptyContent(format!("{} contains no text", source)));
        }
        if char_count < self.params.min_content_chars {
            return Err(RagError::EmptyContent(format!(
                "{} has {} characters, fewer than the minimum of {}",
                source, char_count, self.params.min_content_chars
            )));
        }

        let doc_id = Uuid::new_v4().to_string();
        let pieces = chunk_text(
            text,
            self.params.chunking.chunk_size,
            self.params.chunking.overlap,
        )?;
        let total = pieces.len();

        let mut chunks = Vec::with_capacity(total);
        let mut failed = 0usize;
        let mut index = 0usize;
        for batch in pieces.chunks(self.params.batch_size) {
            for (text, embedding) in batch.iter().zip(self.embed_batch(batch).await) {
                let chunk_index = index;
                index += 1;
                match embedding {
                    Some(embedding) => chunks.push(Chunk {
                        id: chunk_id(&doc_id, chunk_index),
                        document_id: doc_id.clone(),
                        source: source.to_string(),
                        chunk_index,
                        text: text.clone(),
                        embedding,
                    }),
                    None => failed += 1,
                }
            }
        }

        if chunks.is_empty() {
            return Err(RagError::Embedding(format!(
                "all {} chunks of {} failed to embed",
                total, source
            )));
        }
        if failed > 0 {
            warn!(source, failed, total, "dropped chunks that failed to embed");
        }

        let document = Document {
            id: doc_id.clone(),
            source: source.to_string(),
            kind,
            created_at: chrono::Utc::now().timestamp(),
            char_count,
            chunk_count: chunks.len(),
        };

        self.store.upsert(&chunks).await?;
        if let Err(e) = self.store.record_document(&document).await {
            // Keep chunk writes and the document index in sync.
            if let Err(cleanup) = self.store.delete_by_document(&doc_id).await {
                warn!(doc_id = %doc_id, error = %cleanup, "rollback after failed document record");
            }
            return Err(e);
        }

        info!(
            doc_id = %doc_id,
            source,
            kind = %kind,
            chunks = chunks.len(),
            chars = char_count,
            "ingested document"
        );

        Ok(IngestReport {
            document,
            chunks_written: chunks.len(),
            chunks_failed: failed,
        })
    }

    /// Embed a batch, falling back to one call per item when the batch fails.
    /// `None` marks an item that could not be embedded at the store's dimension.
    async fn embed_batch(&self, batch: &[String]) -> Vec<Option<Vec<f32>>> {
        let dims = self.store.dims();
        let accept = |v: Vec<f32>| (v.len() == dims).then_some(v);

        match self.embedder.embed(batch).await {
            Ok(vectors) if vectors.len() == batch.len() => {
                return vectors.into_iter().map(accept).collect();
            }
            Ok(vectors) => warn!(
                expected = batch.len(),
                got = vectors.len(),
                "embedding batch returned wrong count, retrying per item"
            ),
            Err(e) => warn!(error = %e, size = batch.len(), "embedding batch failed, retrying per item"),
        }

        let mut out = Vec::with_capacity(batch.len());
        for text in batch {
            match self.embedder.embed_one(text).await {
                Ok(v) => out.push(accept(v)),
                Err(e) => {
                    warn!(error = %e, "chunk embedding failed");
                    out.push(None);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;

    /// Fails any batch or item containing `poison`.
    struct FlakyEmbedder {
        inner: HashEmbedder,
        poison: &'static str,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn model_name(&self) -> &str {
            "flaky"
        }

        fn dims(&self) -> usize {
            self.inner.dims()
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains(self.poison)) {
                return Err(RagError::Embedding("input too long".into()));
            }
            self.inner.embed(texts).await
        }
    }

    fn ingestor(embedder: Arc<dyn Embedder>, store: Arc<InMemoryStore>, size: usize) -> Ingestor {
        Ingestor::new(
            embedder,
            store,
            IngestParams {
                chunking: ChunkingParams {
                    chunk_size: size,
                    overlap: 2,
                },
                min_content_chars: 10,
                batch_size: 4,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let store = Arc::new(InMemoryStore::new(16));
        let ing = ingestor(Arc::new(HashEmbedder::new(16).unwrap()), store.clone(), 20);
        for text in ["", "   \n\t ", "tiny"] {
            let err = ing.ingest("a.pdf", DocumentKind::Pdf, text).await.unwrap_err();
            assert!(matches!(err, RagError::EmptyContent(_)), "{text:?}");
        }
        assert!(store.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_stores_all_chunks() {
        let store = Arc::new(InMemoryStore::new(16));
        let ing = ingestor(Arc::new(HashEmbedder::new(16).unwrap()), store.clone(), 20);
        let text = "word ".repeat(40);
        let report = ing.ingest("notes.txt", DocumentKind::Text, &text).await.unwrap();

        let expected = crate::chunk::expected_chunk_count(text.trim().chars().count(), 20, 2);
        assert_eq!(report.chunks_written, expected);
        assert_eq!(report.chunks_failed, 0);
        assert_eq!(report.document.chunk_count, expected);
        assert_eq!(store.chunk_count(), expected);

        let docs = store.list_documents().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, report.document.id);
    }

    #[tokio::test]
    async fn test_failed_chunk_is_dropped() {
        let store = Arc::new(InMemoryStore::new(16));
        let embedder = Arc::new(FlakyEmbedder {
            inner: HashEmbedder::new(16).unwrap(),
            poison: "POISON",
        });
        let ing = ingestor(embedder, store.clone(), 20);
        let text = format!("{}POISON{}", "a".repeat(40), "b".repeat(40));
        let report = ing.ingest("mixed.pdf", DocumentKind::Pdf, &text).await.unwrap();

        assert!(report.chunks_failed >= 1);
        assert!(report.chunks_written >= 1);
        assert_eq!(store.chunk_count(), report.chunks_written);
        let hits = store
            .search(&HashEmbedder::new(16).unwrap().embed_one("x").await.unwrap(), 100)
            .await
            .unwrap();
        assert!(hits.iter().all(|h| !h.chunk.text.contains("POISON")));
    }

    #[tokio::test]
    async fn test_all_chunks_failing_aborts() {
        let store = Arc::new(InMemoryStore::new(16));
        let embedder = Arc::new(FlakyEmbedder {
            inner: HashEmbedder::new(16).unwrap(),
            poison: "e",
        });
        let ing = ingestor(embedder, store.clone(), 20);
        let err = ing
            .ingest("e.txt", DocumentKind::Text, "eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
        assert!(store.list_documents().await.unwrap().is_empty());
        assert_eq!(store.chunk_count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_dimension_vectors_are_dropped() {
        let store = Arc::new(InMemoryStore::new(8));
        let ing = ingestor(Arc::new(HashEmbedder::new(16).unwrap()), store.clone(), 20);
        let err = ing
            .ingest("x.txt", DocumentKind::Text, "some perfectly fine text")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_reingest_creates_new_document() {
        let store = Arc::new(InMemoryStore::new(16));
        let ing = ingestor(Arc::new(HashEmbedder::new(16).unwrap()), store.clone(), 50);
        let a = ing.ingest("same.pdf", DocumentKind::Pdf, "The sky is blue.").await.unwrap();
        let b = ing.ingest("same.pdf", DocumentKind::Pdf, "The sky is blue.").await.unwrap();
        assert_ne!(a.document.id, b.document.id);
        assert_eq!(store.list_documents().await.unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let store = Arc::new(InMemoryStore::new(4));
        let embedder = Arc::new(HashEmbedder::new(4).unwrap());
        let bad = IngestParams {
            batch_size: 0,
            ..IngestParams::default()
        };
        assert!(Ingestor::new(embedder, store, bad).is_err());
    }
}
