use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{byte_offset, char_len, normalize_whitespace};

/// Default chunk bound, tuned to the speech model's reliable input length.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 166;

/// Sentence-final or clause-final punctuation followed by whitespace.
static BOUNDARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([.!?؟;؛،]+)\s+").expect("valid regex"));

/// A bounded piece of text handed to one synthesis call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position of the chunk in the source text.
    pub index: usize,
    /// Whitespace-normalized text.
    pub text: String,
    /// Length of `text` in characters.
    pub char_len: usize,
}

/// Splits prose into sentences.
///
/// Returning an empty list means "no opinion" and lets the caller fall back.
pub trait SentenceSplitter: Send + Sync {
    fn split(&self, text: &str) -> Vec<String>;
}

/// Regex splitter on Latin and Arabic punctuation (`. ! ? ؟ ; ؛ ،`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PunctuationSplitter;

impl SentenceSplitter for PunctuationSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for caps in BOUNDARY_RE.captures_iter(text) {
            let (Some(whole), Some(punct)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            push_trimmed(&mut sentences, &text[start..punct.end()]);
            start = whole.end();
        }
        push_trimmed(&mut sentences, &text[start..]);

        sentences
    }
}

fn push_trimmed(out: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Where an over-long sentence may be wrapped.
#[derive(Debug, Clone, Copy)]
enum SplitPoint {
    /// Break after the marker (punctuation stays with the left piece).
    After(&'static str),
    /// Break before the marker (a conjunction starts the right piece).
    Before(&'static str),
}

/// Preferred wrap points, highest priority first.
const PREFERRED_SPLITS: &[SplitPoint] = &[
    SplitPoint::Before(" و"),
    SplitPoint::After("،"),
    SplitPoint::After(";"),
    SplitPoint::After("؛"),
    SplitPoint::Before(" أو "),
    SplitPoint::Before(" ثم "),
    SplitPoint::After(","),
    SplitPoint::After(":"),
    SplitPoint::Before(" لكن "),
    SplitPoint::Before(" بل "),
];

/// Chunker for synthesizer-safe text segments.
///
/// Sentences come from the primary splitter when one is configured and it
/// yields anything, otherwise from [`PunctuationSplitter`].
#[derive(Clone, Default)]
pub struct Chunker {
    primary: Option<Arc<dyn SentenceSplitter>>,
    fallback: PunctuationSplitter,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("primary", &self.primary.is_some())
            .finish()
    }
}

impl Chunker {
    /// Chunker that only uses the punctuation splitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunker that tries `splitter` before the punctuation fallback.
    pub fn with_splitter(splitter: Arc<dyn SentenceSplitter>) -> Self {
        Self {
            primary: Some(splitter),
            fallback: PunctuationSplitter,
        }
    }

    /// Split `text` into chunks of at most `max_chars` characters.
    ///
    /// A chunk only exceeds the bound when it is a single token with no
    /// usable split point; such tokens are passed through unmodified.
    pub fn segment(&self, text: &str, max_chars: usize) -> Vec<TextChunk> {
        let max_chars = max_chars.max(1);
        let normalized = normalize_whitespace(text);
        if normalized.is_empty() {
            return Vec::new();
        }

        if char_len(&normalized) <= max_chars {
            return vec![make_chunk(0, normalized)];
        }

        let pieces: Vec<String> = self
            .sentences(&normalized)
            .into_iter()
            .flat_map(|sentence| {
                if char_len(&sentence) > max_chars {
                    wrap_sentence(&sentence, max_chars)
                } else {
                    vec![sentence]
                }
            })
            .collect();

        let chunks: Vec<TextChunk> = pack(pieces, max_chars)
            .into_iter()
            .map(|text| normalize_whitespace(&text))
            .filter(|text| !text.is_empty())
            .enumerate()
            .map(|(index, text)| make_chunk(index, text))
            .collect();

        log::debug!(
            "Chunked {} chars into {} chunks (max {})",
            char_len(&normalized),
            chunks.len(),
            max_chars
        );
        chunks
    }

    fn sentences(&self, text: &str) -> Vec<String> {
        if let Some(primary) = &self.primary {
            let sentences: Vec<String> = primary
                .split(text)
                .into_iter()
                .filter(|s| !s.trim().is_empty())
                .collect();
            if !sentences.is_empty() {
                return sentences;
            }
            log::debug!("Primary sentence splitter yielded nothing, using punctuation fallback");
        }

        let sentences = self.fallback.split(text);
        if sentences.is_empty() {
            vec![text.to_string()]
        } else {
            sentences
        }
    }
}

fn make_chunk(index: usize, text: String) -> TextChunk {
    TextChunk {
        index,
        char_len: char_len(&text),
        text,
    }
}

/// Greedily join consecutive pieces while the joined length fits.
fn pack(pieces: Vec<String>, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for piece in pieces {
        let piece_len = char_len(&piece);
        if current.is_empty() {
            current = piece;
            current_len = piece_len;
        } else if current_len + 1 + piece_len <= max_chars {
            current.push(' ');
            current.push_str(&piece);
            current_len += 1 + piece_len;
        } else {
            chunks.push(std::mem::replace(&mut current, piece));
            current_len = piece_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Wrap one over-long sentence into pieces no longer than `max_chars`.
fn wrap_sentence(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = sentence.trim();

    while char_len(rest) > max_chars {
        let window_end = byte_offset(rest, max_chars);
        let window = &rest[..window_end];

        let at = preferred_split(window, max_chars)
            .or_else(|| whitespace_split(window, max_chars))
            .or_else(|| oversized_token_split(rest, window, max_chars))
            .unwrap_or(window_end);

        push_trimmed(&mut pieces, &rest[..at]);
        rest = rest[at..].trim_start();
    }

    push_trimmed(&mut pieces, rest);
    pieces
}

/// Right-most preferred split point past a third of the bound.
fn preferred_split(window: &str, max_chars: usize) -> Option<usize> {
    let min_chars = max_chars / 3;

    PREFERRED_SPLITS.iter().find_map(|point| {
        let at = match *point {
            SplitPoint::After(marker) => window.rfind(marker).map(|i| i + marker.len()),
            SplitPoint::Before(marker) => window.rfind(marker),
        }?;
        (char_len(&window[..at]) > min_chars).then_some(at)
    })
}

/// Last whitespace past half of the bound.
fn whitespace_split(window: &str, max_chars: usize) -> Option<usize> {
    let at = window.rfind(char::is_whitespace)?;
    (char_len(&window[..at]) > max_chars / 2).then_some(at)
}

/// Split that keeps a token longer than the bound whole.
///
/// The token crossing the end of `window` is isolated at the whitespace
/// before it; once it leads `rest` it is emitted as one oversized piece.
fn oversized_token_split(rest: &str, window: &str, max_chars: usize) -> Option<usize> {
    let ws = window.char_indices().rev().find(|(_, c)| c.is_whitespace());
    let token_start = ws.map_or(0, |(i, c)| i + c.len_utf8());
    let token_end = rest[token_start..]
        .find(char::is_whitespace)
        .map_or(rest.len(), |i| token_start + i);

    let token_len = char_len(&rest[token_start..token_end]);
    if token_len <= max_chars {
        return None;
    }
    match ws {
        Some((i, _)) => Some(i),
        None => {
            log::warn!("Token of {token_len} chars has no split point, emitting oversized chunk");
            Some(token_end)
        }
    }
}
