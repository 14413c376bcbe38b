//! Text preparation for speech synthesis.
//!
//! Long articles are cut into chunks the speech model can render reliably in a
//! single call, keeping sentence and clause boundaries intact where possible.

pub mod chunker;

pub use chunker::{Chunker, PunctuationSplitter, SentenceSplitter, TextChunk, DEFAULT_MAX_CHUNK_CHARS};

/// Collapse every run of whitespace into a single space and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Length in characters (Unicode scalar values), not bytes.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte offset of the `n`th character, or the string length if it has fewer.
pub(crate) fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map(|(i, _)| i).unwrap_or(text.len())
}
