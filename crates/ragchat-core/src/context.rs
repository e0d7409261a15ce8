//! Context assembly: ranked chunks to a bounded, source-labelled prompt block.
//!
//! Each included chunk is rendered as
//!
//! ```text
//! [Source 1: report.pdf]
//! <chunk text>
//! ```
//!
//! and entries are joined by a blank line. Chunks are taken in the given
//! (descending score) order and included whole; assembly stops at the first
//! chunk whose entry would push the rendered text past `max_context_chars`.
//! The character count covers labels and separators, so the returned text
//! never exceeds the budget.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{RagError, Result};
use crate::models::SearchHit;

/// Context text used in prompts when retrieval found nothing.
pub const EMPTY_CONTEXT: &str = "No relevant context found.";

/// Room reserved for one `[Source n: ...]` label and its separator.
pub const ENTRY_OVERHEAD_CHARS: usize = 128;

const SEPARATOR: &str = "\n\n";

/// Reject a context budget too small to hold one full-size chunk.
pub fn check_budget(max_context_chars: usize, chunk_size: usize) -> Result<()> {
    let needed = chunk_size + ENTRY_OVERHEAD_CHARS;
    if max_context_chars < needed {
        return Err(RagError::InvalidInput(format!(
            "max_context_chars ({}) must be at least chunk_size + {} ({})",
            max_context_chars, ENTRY_OVERHEAD_CHARS, needed
        )));
    }
    Ok(())
}

/// Output of [`assemble`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssembledContext {
    pub text: String,
    /// Distinct `source` values of included chunks, in first-use order.
    pub sources: Vec<String>,
    pub chunks_used: usize,
    /// Distinct retrieved chunks left out because they did not fit.
    pub chunks_omitted: usize,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.chunks_used == 0
    }
}

/// Build the prompt context from ranked hits.
///
/// Duplicate chunk ids are skipped. Deterministic for identical input.
pub fn assemble(hits: &[SearchHit], max_context_chars: usize) -> AssembledContext {
    let mut out = AssembledContext::default();
    let mut used_chars = 0usize;
    let mut seen_chunks = HashSet::new();
    let sep_chars = SEPARATOR.chars().count();

    let mut full = false;

    for hit in hits {
        if !seen_chunks.insert(hit.chunk.id.as_str()) {
            continue;
        }
        if full {
            out.chunks_omitted += 1;
            continue;
        }

        let entry = format!(
            "[Source {}: {}]\n{}",
            out.chunks_used + 1,
            hit.chunk.source,
            hit.chunk.text
        );
        let extra = if out.chunks_used == 0 { 0 } else { sep_chars };
        let entry_chars = entry.chars().count() + extra;
        if used_chars + entry_chars > max_context_chars {
            full = true;
            out.chunks_omitted += 1;
            continue;
        }

        if out.chunks_used > 0 {
            out.text.push_str(SEPARATOR);
        }
        out.text.push_str(&entry);
        used_chars += entry_chars;
        out.chunks_used += 1;

        if !out.sources.iter().any(|s| s == &hit.chunk.source) {
            out.sources.push(hit.chunk.source.clone());
        }
    }

    out
}

/// Up to `max_chars` characters of `text`, for error-path excerpts.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}
