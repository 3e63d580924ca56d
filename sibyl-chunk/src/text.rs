//! # Sentence-Aware Text Chunking
//!
//! This module provides utilities for splitting prose documents into
//! overlapping chunks suitable for embedding and retrieval. Unlike naive
//! fixed-width splitting, chunk boundaries always fall between sentences so
//! no chunk ever starts or ends mid-sentence.
//!
//! ## Overview
//!
//! The pipeline is:
//!
//! 1. [`normalize_whitespace`] collapses runs of whitespace (newlines, tabs,
//!    repeated spaces) into single spaces and trims the ends.
//! 2. [`split_sentences`] cuts the normalized text at terminator punctuation
//!    (`.`, `!`, `?`, `…`), optionally followed by closing quotes or brackets,
//!    at a whitespace boundary.
//! 3. [`TextSplitter::split`] packs sentences greedily into chunks of at most
//!    `chunk_size` characters and seeds each new chunk with the trailing
//!    sentences of the previous one until at least `chunk_overlap` characters
//!    of overlap are carried over.
//!
//! Character accounting counts sentence characters only; the single spaces
//! re-inserted when sentences are joined are not charged against the budget.
//!
//! ## Example
//!
//! ```
//! use sibyl_chunk::text::TextSplitter;
//!
//! let splitter = TextSplitter::new(80, 20);
//! let chunks = splitter.split("First sentence here. Second sentence here. Third one.");
//! assert!(!chunks.is_empty());
//! ```

use regex::Regex;
use std::sync::OnceLock;

/// Default maximum chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

static SENTENCE_BOUNDARY: OnceLock<Regex> = OnceLock::new();

fn sentence_boundary() -> &'static Regex {
    SENTENCE_BOUNDARY.get_or_init(|| {
        // Terminator punctuation, optional closing quotes/brackets, then the
        // whitespace that separates it from the next sentence.
        Regex::new(r#"[.!?…]+["'»”’)\]]*\s+"#).unwrap()
    })
}

/// Collapses all whitespace runs into single spaces and trims both ends.
///
/// Newlines, tabs, and repeated spaces from scraped HTML all normalize to a
/// single space, so downstream length accounting sees a stable view of the
/// text.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits text into sentences using a rule-based boundary detector.
///
/// A sentence ends at terminator punctuation (`.`, `!`, `?`, `…`), optionally
/// followed by closing quotes or brackets, when whitespace follows. Trailing
/// text without a terminator is returned as a final sentence. Abbreviations
/// like "Dr." are not recognized and will end a sentence.
///
/// # Arguments
/// * `text` - The text to split, ideally already whitespace-normalized
///
/// # Returns
/// Sentence slices borrowed from the input, each with the terminator kept and
/// surrounding whitespace trimmed. Empty input yields an empty vector.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for boundary in sentence_boundary().find_iter(text) {
        let sentence = text[start..boundary.end()].trim_end();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = boundary.end();
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

/// Splits documents into overlapping, sentence-aligned chunks.
///
/// Sentences are packed greedily: a sentence joins the current chunk while
/// the accumulated sentence length stays within `chunk_size` (a chunk always
/// accepts its first sentence, so a single oversized sentence becomes its own
/// chunk). When a sentence overflows, the chunk is emitted and the splitter
/// walks backward through it, accumulating sentence lengths until at least
/// `chunk_overlap` characters are covered; those trailing sentences seed the
/// next chunk together with the overflowing sentence. The seed always
/// includes at least the final sentence of the emitted chunk.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl TextSplitter {
    /// Creates a splitter with the given chunk size and overlap, both in
    /// characters of sentence text.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Maximum chunk size in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Overlap carried between consecutive chunks in characters.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits `text` into overlapping, sentence-aligned chunks.
    ///
    /// The input is whitespace-normalized first. Every sentence of the input
    /// appears in at least one chunk, and consecutive chunks share the
    /// trailing sentences of the former up to the configured overlap.
    ///
    /// # Arguments
    /// * `text` - The document text to split
    ///
    /// # Returns
    /// Chunk strings in document order. Empty or whitespace-only input yields
    /// an empty vector.
    pub fn split(&self, text: &str) -> Vec<String> {
        let normalized = normalize_whitespace(text);
        if normalized.is_empty() {
            return Vec::new();
        }

        let sentences = split_sentences(&normalized);
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_len = 0usize;

        for sentence in sentences {
            if current.is_empty() || current_len + sentence.len() <= self.chunk_size {
                current_len += sentence.len();
                current.push(sentence);
                continue;
            }

            chunks.push(current.join(" "));

            // Walk backward until the accumulated tail covers the overlap.
            let mut seed_start = 0;
            let mut seed_len = 0;
            for (i, kept) in current.iter().enumerate().rev() {
                seed_len += kept.len();
                if seed_len >= self.chunk_overlap {
                    seed_start = i;
                    break;
                }
            }

            current.drain(..seed_start);
            current.push(sentence);
            current_len = current.iter().map(|s| s.len()).sum();
        }

        if !current.is_empty() {
            chunks.push(current.join(" "));
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Nine sentences of exactly 19 characters each.
    fn fixed_sentences() -> Vec<String> {
        (1..=9).map(|i| format!("Item {i:02} aaaaaaaaaa.")).collect()
    }

    #[test]
    fn test_split_sentences_basic() {
        let sentences = split_sentences("First sentence. Second one! Third?");
        assert_eq!(sentences, vec!["First sentence.", "Second one!", "Third?"]);
    }

    #[test]
    fn test_split_sentences_keeps_closing_quotes() {
        let sentences = split_sentences("He said \"Stop.\" Then he left.");
        assert_eq!(sentences, vec!["He said \"Stop.\"", "Then he left."]);
    }

    #[test]
    fn test_split_sentences_unterminated_tail() {
        let sentences = split_sentences("Complete sentence. trailing fragment without end");
        assert_eq!(
            sentences,
            vec!["Complete sentence.", "trailing fragment without end"]
        );
    }

    #[test]
    fn test_split_sentences_ignores_decimal_points() {
        let sentences = split_sentences("The value is 3.14 exactly. Next sentence.");
        assert_eq!(
            sentences,
            vec!["The value is 3.14 exactly.", "Next sentence."]
        );
    }

    #[test]
    fn test_split_sentences_empty_input() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(
            normalize_whitespace("  one\n\ttwo   three \r\n four  "),
            "one two three four"
        );
        assert_eq!(normalize_whitespace("\n \t"), "");
    }

    #[test]
    fn test_single_chunk_when_text_fits() {
        let splitter = TextSplitter::default();
        let chunks = splitter.split("Short text. It fits in one chunk.");
        assert_eq!(chunks, vec!["Short text. It fits in one chunk."]);
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let splitter = TextSplitter::default();
        assert!(splitter.split("").is_empty());
        assert!(splitter.split(" \n\t ").is_empty());
    }

    #[test]
    fn test_chunk_boundaries_and_overlap() {
        let sentences = fixed_sentences();
        let text = sentences.join(" ");

        // 5 sentences fit exactly (5 * 19 = 95); an overlap of 20 needs the
        // last two sentences of each emitted chunk (19 < 20 <= 38).
        let splitter = TextSplitter::new(95, 20);
        let chunks = splitter.split(&text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], sentences[0..5].join(" "));
        assert_eq!(chunks[1], sentences[3..8].join(" "));
        assert_eq!(chunks[2], sentences[6..9].join(" "));
    }

    #[test]
    fn test_overlap_shares_trailing_sentences() {
        let sentences = fixed_sentences();
        let splitter = TextSplitter::new(95, 20);
        let chunks = splitter.split(&sentences.join(" "));

        for pair in chunks.windows(2) {
            let overlap: Vec<&String> = sentences
                .iter()
                .filter(|s| pair[0].contains(s.as_str()) && pair[1].contains(s.as_str()))
                .collect();
            let shared: usize = overlap.iter().map(|s| s.len()).sum();
            assert!(
                shared >= 20,
                "consecutive chunks share only {shared} characters"
            );
        }
    }

    #[test]
    fn test_every_sentence_appears_in_some_chunk() {
        let sentences = fixed_sentences();
        let splitter = TextSplitter::new(95, 20);
        let chunks = splitter.split(&sentences.join(" "));

        for sentence in &sentences {
            assert!(
                chunks.iter().any(|c| c.contains(sentence.as_str())),
                "sentence {sentence:?} missing from all chunks"
            );
        }
    }

    #[test]
    fn test_oversized_sentence_becomes_own_chunk() {
        let big = format!("{}.", "a".repeat(300));
        let text = format!("{big} Tiny follow-up.");

        let splitter = TextSplitter::new(50, 20);
        let chunks = splitter.split(&text);

        assert_eq!(chunks[0], big);
        // The oversized sentence also satisfies the overlap requirement, so
        // it seeds the next chunk.
        assert!(chunks[1].starts_with(big.as_str()));
        assert!(chunks[1].ends_with("Tiny follow-up."));
    }

    #[test]
    fn test_whitespace_normalized_before_chunking() {
        let splitter = TextSplitter::default();
        let chunks = splitter.split("Line one.\n\n\tLine   two.");
        assert_eq!(chunks, vec!["Line one. Line two."]);
    }
}
