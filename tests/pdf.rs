//! PDF extraction and ingestion through the engine.

use std::sync::Arc;

use async_trait::async_trait;

use ragchat::extract::PdfTextExtractor;
use ragchat_core::acquire::TextExtractor;
use ragchat_core::embedding::HashEmbedder;
use ragchat_core::engine::EngineParams;
use ragchat_core::generate::GenerationBackend;
use ragchat_core::models::DocumentKind;
use ragchat_core::store::memory::InMemoryStore;
use ragchat_core::{RagEngine, RagError, Result};

const PHRASE: &str = "harbor lights guide ships home";

/// Single-page PDF showing `phrase` in Helvetica. The body is written
/// first so the xref table gets correct byte offsets.
fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

struct Silent;

#[async_trait]
impl GenerationBackend for Silent {
    fn name(&self) -> &str {
        "silent"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok(String::new())
    }
}

fn engine() -> RagEngine {
    RagEngine::new(
        Arc::new(HashEmbedder::new(64).unwrap()),
        Arc::new(InMemoryStore::new(64)),
        Arc::new(Silent),
        EngineParams::default(),
    )
    .unwrap()
    .with_extractor(Arc::new(PdfTextExtractor))
}

fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[tokio::test]
async fn test_extracts_phrase() {
    let text = PdfTextExtractor
        .extract(&minimal_pdf_with_phrase(PHRASE))
        .await
        .unwrap();
    assert!(squash(&text).contains(PHRASE), "extracted: {:?}", text);
}

#[tokio::test]
async fn test_ingest_pdf_indexes_text() {
    let engine = engine();
    let report = engine
        .ingest_pdf("harbor.pdf", &minimal_pdf_with_phrase(PHRASE))
        .await
        .unwrap();
    assert_eq!(report.document.kind, DocumentKind::Pdf);
    assert_eq!(report.document.source, "harbor.pdf");
    assert!(report.chunks_written >= 1);

    let hits = engine.retrieve("harbor lights").await.unwrap();
    assert_eq!(hits[0].chunk.source, "harbor.pdf");
    assert!(squash(&hits[0].chunk.text).contains(PHRASE));
}

#[tokio::test]
async fn test_ingest_pdf_rejections() {
    let engine = engine();
    assert!(matches!(
        engine.ingest_pdf("harbor.txt", &minimal_pdf_with_phrase(PHRASE)).await,
        Err(RagError::InvalidInput(_))
    ));
    assert!(matches!(
        engine.ingest_pdf("broken.pdf", b"not a pdf").await,
        Err(RagError::Extraction(_))
    ));
    assert!(engine.list_documents().await.unwrap().is_empty());
}
