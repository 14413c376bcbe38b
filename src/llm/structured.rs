//! Parsing of strict single-key JSON replies.

use serde_json::Value;

use super::LlmError;

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````), if any.
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest)
        .trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn single_field(reply: &str, key: &str) -> Result<Value, LlmError> {
    let value: Value = serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| LlmError::MalformedReply(format!("not JSON: {e}")))?;

    let Value::Object(mut fields) = value else {
        return Err(LlmError::MalformedReply("expected a JSON object".to_string()));
    };
    if fields.len() != 1 {
        return Err(LlmError::MalformedReply(format!(
            "expected exactly one key, got {}",
            fields.len()
        )));
    }
    fields
        .remove(key)
        .ok_or_else(|| LlmError::MalformedReply(format!("missing key '{key}'")))
}

/// Parse `{"<key>": true|false}`.
pub fn parse_flag(reply: &str, key: &str) -> Result<bool, LlmError> {
    single_field(reply, key)?
        .as_bool()
        .ok_or_else(|| LlmError::MalformedReply(format!("'{key}' is not a boolean")))
}

/// Parse `{"<key>": <integer>}`.
pub fn parse_integer(reply: &str, key: &str) -> Result<i64, LlmError> {
    single_field(reply, key)?
        .as_i64()
        .ok_or_else(|| LlmError::MalformedReply(format!("'{key}' is not an integer")))
}
