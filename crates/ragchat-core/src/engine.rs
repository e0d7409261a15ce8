//! The [`RagEngine`] facade.
//!
//! Wires one embedder, one vector store and one generation backend into
//! the ingestion and chat flows, and exposes the operations every caller
//! surface (CLI, HTTP) maps onto.

use std::sync::Arc;

use tracing::info;

use crate::acquire::{require_http_url, require_pdf_name, Scraper, TextExtractor};
use crate::context::{assemble, check_budget, AssembledContext};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::generate::{Answer, AnswerGenerator, GenerationBackend, GenerationParams};
use crate::ingest::{IngestParams, IngestReport, Ingestor};
use crate::models::{Document, DocumentKind, SearchHit};
use crate::retrieve::{RetrievalParams, Retriever};
use crate::session::{Session, SessionStore};
use crate::store::VectorStore;

/// All pipeline tuning in one place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineParams {
    pub ingest: IngestParams,
    pub retrieval: RetrievalParams,
    pub generation: GenerationParams,
    pub max_context_chars: usize,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            ingest: IngestParams::default(),
            retrieval: RetrievalParams::default(),
            generation: GenerationParams::default(),
            max_context_chars: 6000,
        }
    }
}

pub struct RagEngine {
    store: Arc<dyn VectorStore>,
    sessions: Arc<SessionStore>,
    ingestor: Ingestor,
    retriever: Retriever,
    generator: AnswerGenerator,
    extractor: Option<Arc<dyn TextExtractor>>,
    scraper: Option<Arc<dyn Scraper>>,
    max_context_chars: usize,
}

impl RagEngine {
    /// Build an engine. Fails if the embedder and store disagree on the
    /// vector dimension, any parameter is out of range, or
    /// `max_context_chars` cannot hold one full chunk.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        backend: Arc<dyn GenerationBackend>,
        params: EngineParams,
    ) -> Result<Self> {
        if embedder.dims() != store.dims() {
            return Err(RagError::DimensionMismatch {
                expected: store.dims(),
                actual: embedder.dims(),
            });
        }
        check_budget(params.max_context_chars, params.ingest.chunking.chunk_size)?;
        let sessions = Arc::new(SessionStore::new());
        Ok(Self {
            ingestor: Ingestor::new(embedder.clone(), store.clone(), params.ingest)?,
            retriever: Retriever::new(embedder, store.clone(), params.retrieval)?,
            generator: AnswerGenerator::new(backend, sessions.clone(), params.generation),
            store,
            sessions,
            extractor: None,
            scraper: None,
            max_context_chars: params.max_context_chars,
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_scraper(mut self, scraper: Arc<dyn Scraper>) -> Self {
        self.scraper = Some(scraper);
        self
    }

    pub fn backend_name(&self) -> &str {
        self.generator.backend_name()
    }

    /// Ingest text supplied directly by the caller.
    pub async fn ingest_text(&self, source: &str, text: &str) -> Result<IngestReport> {
        let source = source.trim();
        if source.is_empty() {
            return Err(RagError::InvalidInput("source must not be empty".to_string()));
        }
        self.ingestor.ingest(source, DocumentKind::Text, text).await
    }

    /// Extract text from an uploaded PDF and ingest it under `filename`.
    pub async fn ingest_pdf(&self, filename: &str, bytes: &[u8]) -> Result<IngestReport> {
        require_pdf_name(filename)?;
        let extractor = self
            .extractor
            .as_ref()
            .ok_or_else(|| RagError::Extraction("no PDF extractor configured".to_string()))?;
        let text = extractor.extract(bytes).await?;
        self.ingestor.ingest(filename, DocumentKind::Pdf, &text).await
    }

    /// Scrape a web page and ingest its text under the URL.
    pub async fn ingest_url(&self, url: &str) -> Result<IngestReport> {
        let url = url.trim();
        require_http_url(url)?;
        let scraper = self
            .scraper
            .as_ref()
            .ok_or_else(|| RagError::Scrape("no web scraper configured".to_string()))?;
        let text = scraper.scrape(url).await?;
        self.ingestor.ingest(url, DocumentKind::Url, &text).await
    }

    /// Ranked chunks for a query, using the configured retrieval parameters.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.retriever.retrieve(query).await
    }

    /// Retrieval plus context assembly, without generation.
    pub async fn context_for(&self, query: &str) -> Result<AssembledContext> {
        let hits = self.retriever.retrieve(query).await?;
        Ok(assemble(&hits, self.max_context_chars))
    }

    /// Answer a question in a session, starting one if `session_id` is `None`.
    ///
    /// At most one call per session may be in flight.
    pub async fn chat(&self, session_id: Option<&str>, question: &str) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidInput("question must not be empty".to_string()));
        }
        let context = self.context_for(question).await?;
        let answer = self.generator.answer(session_id, question, &context).await?;
        info!(
            session_id = %answer.session_id,
            chunks = context.chunks_used,
            sources = answer.sources.len(),
            status = ?answer.status,
            "chat answered"
        );
        Ok(answer)
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        self.store.list_documents().await
    }

    /// Explicit lookup; unknown ids are [`RagError::NotFound`].
    pub async fn get_document(&self, doc_id: &str) -> Result<Document> {
        self.store
            .get_document(doc_id)
            .await?
            .ok_or_else(|| RagError::NotFound(format!("document '{}'", doc_id)))
    }

    /// Delete a document and its chunks. Unknown ids remove nothing.
    pub async fn delete_document(&self, doc_id: &str) -> Result<usize> {
        let removed = self.store.delete_by_document(doc_id).await?;
        info!(doc_id, removed, "deleted document");
        Ok(removed)
    }

    pub fn session_history(&self, session_id: &str) -> Result<Session> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| RagError::NotFound(format!("session '{}'", session_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::generate::AnswerStatus;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl GenerationBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &str) -> Result<String> {
            Ok(format!("prompt had {} chars", prompt.len()))
        }
    }

    struct FixedExtractor(&'static str);

    #[async_trait]
    impl TextExtractor for FixedExtractor {
        async fn extract(&self, _bytes: &[u8]) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct DownScraper;

    #[async_trait]
    impl Scraper for DownScraper {
        async fn scrape(&self, url: &str) -> Result<String> {
            Err(RagError::Scrape(format!("{} unreachable", url)))
        }
    }

    fn engine() -> RagEngine {
        RagEngine::new(
            Arc::new(HashEmbedder::new(64).unwrap()),
            Arc::new(InMemoryStore::new(64)),
            Arc::new(Echo),
            EngineParams::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let err = RagEngine::new(
            Arc::new(HashEmbedder::new(32).unwrap()),
            Arc::new(InMemoryStore::new(64)),
            Arc::new(Echo),
            EngineParams::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_context_budget_below_chunk_size_rejected() {
        let params = EngineParams {
            max_context_chars: 100,
            ..EngineParams::default()
        };
        let err = RagEngine::new(
            Arc::new(HashEmbedder::new(64).unwrap()),
            Arc::new(InMemoryStore::new(64)),
            Arc::new(Echo),
            params,
        )
        .err()
        .unwrap();
        assert!(matches!(err, RagError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_get_unknown_document_is_not_found() {
        let e = engine();
        assert!(matches!(
            e.get_document("nope").await,
            Err(RagError::NotFound(_))
        ));
        assert_eq!(e.delete_document("nope").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pdf_requires_name_and_extractor() {
        let e = engine();
        assert!(matches!(
            e.ingest_pdf("a.pdf", b"%PDF").await,
            Err(RagError::Extraction(_))
        ));

        let e = engine().with_extractor(Arc::new(FixedExtractor("Quarterly revenue grew by ten percent.")));
        assert!(matches!(
            e.ingest_pdf("a.docx", b"x").await,
            Err(RagError::InvalidInput(_))
        ));
        let report = e.ingest_pdf("q3.pdf", b"%PDF").await.unwrap();
        assert_eq!(report.document.kind, DocumentKind::Pdf);
        assert_eq!(e.get_document(&report.document.id).await.unwrap().source, "q3.pdf");
    }

    #[tokio::test]
    async fn test_short_extracted_text_is_empty_content() {
        let e = engine().with_extractor(Arc::new(FixedExtractor("  hi  ")));
        assert!(matches!(
            e.ingest_pdf("a.pdf", b"%PDF").await,
            Err(RagError::EmptyContent(_))
        ));
    }

    #[tokio::test]
    async fn test_scrape_failure_propagates() {
        let e = engine().with_scraper(Arc::new(DownScraper));
        assert!(matches!(
            e.ingest_url("https://down.test").await,
            Err(RagError::Scrape(_))
        ));
        assert!(matches!(
            e.ingest_url("not a url").await,
            Err(RagError::InvalidInput(_))
        ));
        assert!(e.list_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chat_records_session() {
        let e = engine();
        e.ingest_text("sky.txt", "The sky is blue. Grass is green.").await.unwrap();
        let ans = e.chat(None, "What color is the sky?").await.unwrap();
        assert_eq!(ans.status, AnswerStatus::Answered);
        assert_eq!(ans.sources, vec!["sky.txt"]);

        let history = e.session_history(&ans.session_id).unwrap();
        assert_eq!(history.turns.len(), 2);
        assert!(matches!(
            e.session_history("missing"),
            Err(RagError::NotFound(_))
        ));
    }
}
