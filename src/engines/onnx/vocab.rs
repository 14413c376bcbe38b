use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use super::model::OnnxError;

/// Phoneme → token ID table.
pub type Vocab = HashMap<char, i64>;

/// Load the vocabulary from a model config or tokenizer JSON file.
///
/// Accepts a top-level `"vocab"` object, the same nested under
/// `"model_args"`, or a bare object mapping single characters to IDs.
pub fn load_vocab(path: &Path) -> Result<Vocab, OnnxError> {
    let content = std::fs::read_to_string(path)?;
    let json: Value = serde_json::from_str(&content)
        .map_err(|e| OnnxError::Vocab(format!("{}: failed to parse JSON: {e}", path.display())))?;
    parse_vocab(&json)
}

fn parse_vocab(json: &Value) -> Result<Vocab, OnnxError> {
    let table = json
        .get("vocab")
        .or_else(|| json.get("model_args").and_then(|args| args.get("vocab")))
        .unwrap_or(json)
        .as_object()
        .ok_or_else(|| OnnxError::Vocab("'vocab' must be an object".to_string()))?;

    let mut map = HashMap::with_capacity(table.len());
    for (k, v) in table {
        let mut chars = k.chars();
        let ch = chars
            .next()
            .ok_or_else(|| OnnxError::Vocab(format!("empty key in vocab: {k:?}")))?;
        if chars.next().is_some() {
            return Err(OnnxError::Vocab(format!("multi-character key in vocab: {k:?}")));
        }
        let id = v
            .as_i64()
            .ok_or_else(|| OnnxError::Vocab(format!("non-integer vocab value for key {k:?}")))?;
        map.insert(ch, id);
    }

    if map.is_empty() {
        return Err(OnnxError::Vocab("vocabulary is empty".to_string()));
    }
    Ok(map)
}

/// IDs of the sentence punctuation tokens present in `vocab`.
pub fn punctuation_ids(vocab: &Vocab) -> Vec<i64> {
    [';', ':', ',', '.', '!', '?']
        .iter()
        .filter_map(|ch| vocab.get(ch).copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_top_level_and_nested_tables() {
        let top = parse_vocab(&json!({ "vocab": { "a": 43, ".": 4 }, "n_token": 178 })).unwrap();
        assert_eq!(top.get(&'a'), Some(&43));

        let nested = parse_vocab(&json!({ "model_args": { "vocab": { "ʔ": 148 } } })).unwrap();
        assert_eq!(nested.get(&'ʔ'), Some(&148));

        let bare = parse_vocab(&json!({ "b": 44 })).unwrap();
        assert_eq!(bare.get(&'b'), Some(&44));
    }

    #[test]
    fn rejects_malformed_tables() {
        assert!(parse_vocab(&json!({ "vocab": [1, 2] })).is_err());
        assert!(parse_vocab(&json!({ "vocab": { "ab": 1 } })).is_err());
        assert!(parse_vocab(&json!({ "vocab": { "a": "1" } })).is_err());
        assert!(parse_vocab(&json!({ "vocab": {} })).is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"vocab": {";": 1, ",": 3, "a": 43}}"#).unwrap();

        let vocab = load_vocab(&path).unwrap();
        let mut punct = punctuation_ids(&vocab);
        punct.sort_unstable();
        assert_eq!(punct, [1, 3]);
    }
}
