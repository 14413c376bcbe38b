use std::borrow::Cow;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::model::OnnxError;
use super::vocab::Vocab;

/// Location of the espeak-ng binary and, optionally, its voice data.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    /// `None` runs `espeak-ng` from PATH.
    pub bin_path: Option<PathBuf>,
    /// Passed as `--path`; `None` uses the compiled-in data directory.
    pub data_path: Option<PathBuf>,
}

impl EspeakConfig {
    fn command(&self) -> Command {
        let program = self
            .bin_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("espeak-ng"));
        let mut command = Command::new(program);
        if let Some(data) = &self.data_path {
            command.arg(format!("--path={}", data.display()));
        }
        command
    }

    /// True when the binary can be started.
    pub fn is_available(&self) -> bool {
        self.command().arg("--version").output().is_ok()
    }
}

/// Map a language tag (`ar`, `ar-SA`, `en_US`) to an espeak-ng voice.
pub fn espeak_voice(language: &str) -> String {
    let tag = language.trim().to_ascii_lowercase().replace('_', "-");
    match tag.as_str() {
        "" => "ar".to_string(),
        t if t == "ar" || t.starts_with("ar-") => "ar".to_string(),
        "en" => "en-us".to_string(),
        other => other.to_string(),
    }
}

/// Convert text to model token IDs via espeak-ng.
///
/// Characters missing from the vocabulary are dropped.
pub fn phonemize(
    text: &str,
    lang: &str,
    vocab: &Vocab,
    espeak: &EspeakConfig,
) -> Result<Vec<i64>, OnnxError> {
    let parts = split_text_parts(text);
    if parts.is_empty() {
        return Ok(Vec::new());
    }

    let text_segments: Vec<&str> = parts
        .iter()
        .filter_map(|part| match part {
            TextPart::Text(segment) => Some(segment.as_str()),
            TextPart::Punct(_) => None,
        })
        .collect();

    let segment_ids = if text_segments.is_empty() {
        Vec::new()
    } else {
        phonemize_segments(&text_segments, lang, vocab, espeak)?
    };

    let mut ids = Vec::new();
    let mut segments = segment_ids.iter();
    for part in parts {
        match part {
            TextPart::Text(_) => {
                if let Some(chunk) = segments.next() {
                    ids.extend_from_slice(chunk);
                }
            }
            TextPart::Punct(ch) => {
                if let Some(&id) = vocab.get(&ch) {
                    ids.push(id);
                }
            }
        }
    }

    Ok(ids)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TextPart {
    Text(String),
    Punct(char),
}

fn split_text_parts(text: &str) -> Vec<TextPart> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for (idx, ch) in text.char_indices() {
        if let Some(punct) = map_boundary_punctuation(ch) {
            if !is_numeric_connector(text, idx, ch) {
                flush_text_part(&mut parts, &mut current);
                parts.push(TextPart::Punct(punct));
                continue;
            }
        }

        if ch.is_whitespace() {
            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
            }
            continue;
        }

        // Tatweel only stretches glyphs.
        if ch == '\u{0640}' {
            continue;
        }

        current.push(ch);
    }

    flush_text_part(&mut parts, &mut current);
    parts
}

fn flush_text_part(parts: &mut Vec<TextPart>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        parts.push(TextPart::Text(trimmed.to_string()));
    }
    current.clear();
}

/// Punctuation that becomes its own token, with Arabic marks mapped onto
/// their Latin vocabulary entries.
fn map_boundary_punctuation(ch: char) -> Option<char> {
    match ch {
        '.' | '!' | '?' | ',' | ';' | ':' | '—' | '…' | '"' | '(' | ')' | '\u{201c}'
        | '\u{201d}' => Some(ch),
        '،' => Some(','),
        '؛' => Some(';'),
        '؟' => Some('?'),
        '«' => Some('\u{201c}'),
        '»' => Some('\u{201d}'),
        '\n' | '\r' => Some('.'),
        _ => None,
    }
}

fn is_digit(ch: char) -> bool {
    ch.is_ascii_digit() || ('\u{0660}'..='\u{0669}').contains(&ch)
}

/// Decimal and thousands separators between digits stay inside the number.
fn is_numeric_connector(text: &str, idx: usize, ch: char) -> bool {
    if !matches!(ch, '.' | ',' | '،') {
        return false;
    }

    let prev = text[..idx].chars().next_back();
    let next = text[idx + ch.len_utf8()..].chars().next();

    matches!(
        (prev, next),
        (Some(left), Some(right)) if is_digit(left) && is_digit(right)
    )
}

fn phonemize_segments(
    segments: &[&str],
    lang: &str,
    vocab: &Vocab,
    espeak: &EspeakConfig,
) -> Result<Vec<Vec<i64>>, OnnxError> {
    let output = run_espeak(&segments.join("\n"), lang, espeak)?;
    let lines: Vec<&str> = output.lines().collect();

    // One output line per input line is expected; otherwise go one by one.
    if lines.len() != segments.len() {
        log::debug!(
            "espeak-ng returned {} lines for {} segments, retrying individually",
            lines.len(),
            segments.len()
        );
        return segments
            .iter()
            .map(|segment| Ok(ipa_to_ids(&run_espeak(segment, lang, espeak)?, vocab)))
            .collect();
    }

    Ok(lines.iter().map(|line| ipa_to_ids(line, vocab)).collect())
}

fn run_espeak(input: &str, lang: &str, espeak: &EspeakConfig) -> Result<String, OnnxError> {
    let mut child = espeak
        .command()
        .args(["--ipa", "--stdin", "-q", "-v", lang])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OnnxError::EspeakNotFound
            } else {
                OnnxError::Io(e)
            }
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(stdin_payload(input).as_bytes())?;
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(OnnxError::PhonemizerFailed(format!(
            "espeak-ng exited with code {:?}: {stderr}",
            output.status.code()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// espeak-ng reads stdin line by line; the last line must be terminated.
fn stdin_payload(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}

fn ipa_to_ids(ipa: &str, vocab: &Vocab) -> Vec<i64> {
    ipa.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .flat_map(str::chars)
        .filter(|&ch| ch != '_')
        .filter_map(|ch| vocab.get(&ch).copied())
        .collect()
}
