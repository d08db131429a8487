//! Splits document text into overlapping windows.

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern compiles"));

/// Collapses runs of whitespace into single spaces and trims the ends.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Fixed-size character windows with overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            size: 1000,
            overlap: 0,
        }
    }
}

impl Chunker {
    /// Creates a chunker. `overlap` is clamped below `size`.
    #[must_use]
    pub fn new(size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            overlap: overlap.min(size - 1),
        }
    }

    /// Window size in characters.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Splits normalized `text` into chunks. Empty text yields no chunks.
    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = normalize_whitespace(text).chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let step = self.size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.size).min(chars.len());
            let chunk: String = chars[start..end].iter().collect();
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }
            if end == chars.len() {
                break;
            }
            start += step;
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a\n\n b\tc  "), "a b c");
    }

    #[test]
    fn test_split_without_overlap() {
        let chunker = Chunker::new(4, 0);
        assert_eq!(chunker.split("abcdefghij"), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_split_with_overlap() {
        let chunker = Chunker::new(4, 2);
        assert_eq!(chunker.split("abcdefgh"), vec!["abcd", "cdef", "efgh"]);
    }

    #[test]
    fn test_empty_text() {
        assert!(Chunker::default().split(" \n ").is_empty());
    }

    #[test]
    fn test_overlap_is_clamped() {
        let chunker = Chunker::new(3, 10);
        assert_eq!(chunker.split("abcde"), vec!["abc", "bcd", "cde"]);
    }

    #[test]
    fn test_multibyte_boundaries() {
        let chunker = Chunker::new(2, 0);
        assert_eq!(chunker.split("héllo"), vec!["hé", "ll", "o"]);
    }
}
