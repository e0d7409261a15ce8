//! Fixed-window text chunker with overlap.
//!
//! Slides a window of `chunk_size` characters across the text, advancing
//! by `chunk_size - overlap` each step. The final window is truncated to
//! whatever remains; nothing is padded. Windows are measured in Unicode
//! scalar values, so multi-byte text is never split inside a character.
//!
//! # Guarantees
//!
//! - Empty text yields no chunks.
//! - Text no longer than `chunk_size` yields exactly one chunk equal to it.
//! - Otherwise the chunk count is `ceil((len - overlap) / (chunk_size - overlap))`.
//! - Consecutive chunks share exactly `overlap` characters, so dropping the
//!   first `overlap` characters of every chunk after the first and
//!   concatenating rebuilds the input.
//!
//! # Example
//!
//! ```rust
//! use ragchat_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("abcdefghij", 4, 1).unwrap();
//! assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Window size and overlap, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingParams {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
        }
    }
}

impl ChunkingParams {
    /// Check `0 <= overlap < chunk_size`.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidInput(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(RagError::InvalidInput(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Split `text` into ordered, overlapping windows.
///
/// # Errors
///
/// Returns [`RagError::InvalidInput`] when `chunk_size` is zero or
/// `overlap >= chunk_size`.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    ChunkingParams {
        chunk_size,
        overlap,
    }
    .validate()?;

    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every char boundary, including the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = boundaries.len() - 1;

    if char_len <= chunk_size {
        return Ok(vec![text.to_string()]);
    }

    let step = chunk_size - overlap;
    let mut chunks = Vec::with_capacity(expected_chunk_count(char_len, chunk_size, overlap));
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(char_len);
        chunks.push(text[boundaries[start]..boundaries[end]].to_string());
        if end == char_len {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Number of chunks [`chunk_text`] produces for a text of `char_len` characters.
pub fn expected_chunk_count(char_len: usize, chunk_size: usize, overlap: usize) -> usize {
    if char_len == 0 {
        return 0;
    }
    if char_len <= chunk_size {
        return 1;
    }
    let step = chunk_size - overlap;
    (char_len - overlap).div_ceil(step)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(chunks: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(c);
            } else {
                out.extend(c.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 10, 2).unwrap().is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 500, 50).unwrap();
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn test_exact_size_single_chunk() {
        let chunks = chunk_text("abcd", 4, 1).unwrap();
        assert_eq!(chunks, vec!["abcd"]);
    }

    #[test]
    fn test_windows_and_overlap() {
        let chunks = chunk_text("abcdefghij", 4, 1).unwrap();
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_last_window_truncated() {
        let chunks = chunk_text("abcdefghijk", 4, 1).unwrap();
        assert_eq!(chunks, vec!["abcd", "defg", "ghij", "jk"]);
    }

    #[test]
    fn test_zero_overlap() {
        let chunks = chunk_text("abcdefg", 3, 0).unwrap();
        assert_eq!(chunks, vec!["abc", "def", "g"]);
    }

    #[test]
    fn test_invalid_params() {
        assert!(matches!(
            chunk_text("abc", 0, 0),
            Err(RagError::InvalidInput(_))
        ));
        assert!(matches!(
            chunk_text("abc", 5, 5),
            Err(RagError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_reconstruction_and_count() {
        let text: String = (0..1234)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        for (size, overlap) in [(500, 50), (100, 0), (7, 6), (64, 13)] {
            let chunks = chunk_text(&text, size, overlap).unwrap();
            assert_eq!(reconstruct(&chunks, overlap), text, "size={size} overlap={overlap}");
            assert_eq!(chunks.len(), expected_chunk_count(1234, size, overlap));
            assert!(chunks.iter().all(|c| c.chars().count() <= size));
        }
    }

    #[test]
    fn test_consecutive_chunks_share_overlap() {
        let text = "The quick brown fox jumps over the lazy dog again and again.";
        let chunks = chunk_text(text, 20, 5).unwrap();
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().skip(pair[0].chars().count() - 5).collect();
            let head: String = pair[1].chars().take(5).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Héllo wörld      │\n└──────────────────┘";
        let chunks = chunk_text(text, 9, 2).unwrap();
        assert!(chunks.len() > 1);
        assert_eq!(reconstruct(&chunks, 2), text);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma delta epsilon zeta eta theta";
        assert_eq!(chunk_text(text, 10, 3).unwrap(), chunk_text(text, 10, 3).unwrap());
    }
}
