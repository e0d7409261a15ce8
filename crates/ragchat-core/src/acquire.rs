//! Content acquisition interfaces.
//!
//! Turning PDF bytes or a web page into plain text is delegated to
//! implementations of these traits; the engine only sees the text.

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// Extracts plain text from an uploaded file.
///
/// Implementations doing CPU-bound parsing must move it off the async
/// worker threads.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Fails with [`RagError::Extraction`] on corrupt or unreadable input.
    async fn extract(&self, bytes: &[u8]) -> Result<String>;
}

/// Fetches a web page and returns its readable text.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Fails with [`RagError::Scrape`] when the site is unreachable or blocked.
    async fn scrape(&self, url: &str) -> Result<String>;
}

/// Check that an uploaded file name looks like a PDF.
pub fn require_pdf_name(filename: &str) -> Result<()> {
    if filename.to_ascii_lowercase().ends_with(".pdf") {
        Ok(())
    } else {
        Err(RagError::InvalidInput(format!(
            "only PDF files are supported, got '{}'",
            filename
        )))
    }
}

/// Check that a URL uses http or https.
pub fn require_http_url(url: &str) -> Result<()> {
    let lower = url.trim().to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(RagError::InvalidInput(format!(
            "expected an http(s) URL, got '{}'",
            url
        ))),
    }
}
