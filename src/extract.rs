//! Content acquisition: PDF text extraction and web page scraping.
//!
//! Both adapters return plain UTF-8 text and map every failure to the
//! matching [`RagError`] variant; the engine decides whether the text is
//! long enough to ingest.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;

use ragchat_core::acquire::{Scraper, TextExtractor};
use ragchat_core::{RagError, Result};

/// Browser-like User-Agent; some sites refuse obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
/// `<article>`/`<main>` text must be longer than this to be preferred over the full body.
const MIN_ARTICLE_CHARS: usize = 50;

// ============ PDF ============

/// Extracts text from PDF bytes with `pdf-extract` on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, bytes: &[u8]) -> Result<String> {
        if bytes.is_empty() {
            return Err(RagError::Extraction("empty upload".to_string()));
        }
        let bytes = bytes.to_vec();
        run_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes)
                .map(|text| text.trim().to_string())
                .map_err(|e| RagError::Extraction(format!("PDF extraction failed: {}", e)))
        })
        .await
    }
}

/// Run a parsing job on tokio's blocking pool. A panic inside the parser
/// surfaces as an extraction error.
async fn run_blocking<F>(job: F) -> Result<String>
where
    F: FnOnce() -> Result<String> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| RagError::Extraction(format!("PDF extraction task failed: {}", e)))?
}

// ============ Web ============

/// Fetches pages with `reqwest` and reduces the HTML to readable text.
pub struct WebScraper {
    client: reqwest::Client,
}

impl WebScraper {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(timeout)
                .build()?,
        })
    }
}

#[async_trait]
impl Scraper for WebScraper {
    async fn scrape(&self, url: &str) -> Result<String> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RagError::Scrape(format!("could not fetch {}: {}", url, e)))?;

        let status = res.status();
        if !status.is_success() {
            return Err(RagError::Scrape(format!("{} returned HTTP {}", url, status)));
        }

        let content_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();

        let body = res
            .text()
            .await
            .map_err(|e| RagError::Scrape(format!("could not read {}: {}", url, e)))?;
        debug!(url, bytes = body.len(), content_type = %content_type, "fetched page");

        if content_type.contains("html") || content_type.contains("xml") {
            Ok(html_to_text(&body))
        } else if content_type.starts_with("text/") {
            Ok(collapse_whitespace(&body))
        } else {
            Err(RagError::Scrape(format!(
                "{} has unsupported content type '{}'",
                url, content_type
            )))
        }
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Readable text of an HTML page.
///
/// `script`, `style`, and `noscript` elements are dropped. If the page has
/// an `<article>` or `<main>` element with more than 50 characters of text,
/// only that is returned; otherwise the whole body. Whitespace is collapsed.
pub fn html_to_text(html: &str) -> String {
    let mut document = Html::parse_document(html);

    if let Some(unwanted) = selector("script, style, noscript, template") {
        let ids: Vec<_> = document.select(&unwanted).map(|el| el.id()).collect();
        for id in ids {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }
    }

    if let Some(article) = selector("article, main") {
        let text = document
            .select(&article)
            .map(|el| collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if text.chars().count() > MIN_ARTICLE_CHARS {
            return text;
        }
    }

    let body = selector("body").and_then(|sel| document.select(&sel).next());
    let raw = match body {
        Some(el) => el.text().collect::<Vec<_>>().join(" "),
        None => document.root_element().text().collect::<Vec<_>>().join(" "),
    };
    collapse_whitespace(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_article_text() {
        let html = r#"<html><head><title>t</title><style>body{color:red}</style></head>
            <body><nav>Home | About</nav>
            <article><h1>Rust 2024</h1><p>The new edition brings async closures and many other improvements.</p></article>
            <script>var tracking = 1;</script></body></html>"#;
        let text = html_to_text(html);
        assert!(text.starts_with("Rust 2024"));
        assert!(text.contains("async closures"));
        assert!(!text.contains("Home | About"));
        assert!(!text.contains("tracking"));
    }

    #[test]
    fn test_short_article_falls_back_to_body() {
        let html = "<html><body><p>Intro   paragraph\n\nwith spacing.</p><main>Tiny</main><script>x()</script></body></html>";
        let text = html_to_text(html);
        assert_eq!(text, "Intro paragraph with spacing. Tiny");
    }

    #[tokio::test]
    async fn test_invalid_pdf_is_extraction_error() {
        let err = PdfTextExtractor.extract(b"definitely not a pdf").await.unwrap_err();
        assert!(matches!(err, RagError::Extraction(_)));
        assert!(matches!(
            PdfTextExtractor.extract(b"").await,
            Err(RagError::Extraction(_))
        ));
    }

    #[tokio::test]
    async fn test_parser_panic_is_extraction_error() {
        let err = run_blocking(|| panic!("malformed xref table")).await.unwrap_err();
        assert!(matches!(err, RagError::Extraction(_)));
        assert!(err.to_string().contains("task failed"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_extraction_leaves_runtime_free() {
        let ticker = tokio::spawn(async {
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
        });
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let job = tokio::spawn(run_blocking(move || {
            rx.recv_timeout(std::time::Duration::from_secs(5))
                .map(|_| "done".to_string())
                .map_err(|e| RagError::Extraction(e.to_string()))
        }));

        // The blocking job waits for this send, so the ticker can only
        // finish first if the job is off the single runtime thread.
        ticker.await.unwrap();
        tx.send(()).unwrap();
        assert_eq!(job.await.unwrap().unwrap(), "done");
    }

    #[tokio::test]
    async fn test_unreachable_site_is_scrape_error() {
        let scraper = WebScraper::new(Duration::from_secs(2)).unwrap();
        let err = scraper.scrape("http://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(err, RagError::Scrape(_)));
    }
}
