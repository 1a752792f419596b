//! Lenient handling of model output: artifact stripping and JSON recovery
//! from replies that wrap the object in prose or code fences.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::LlmError;

/// Strip model artifacts (reasoning blocks) and surrounding whitespace.
pub fn sanitize_llm_output(raw: &str) -> String {
    static THINK_BLOCK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));
    THINK_BLOCK_RE.replace_all(raw, "").trim().to_string()
}

/// Locate a JSON object or array inside free-form model text.
pub fn extract_json_block(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return Some(after_fence[..end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            let block = after_fence[..end].trim();
            if block.starts_with('{') || block.starts_with('[') {
                return Some(block);
            }
        }
    }

    trimmed.find('{').and_then(|start| balanced_object(&trimmed[start..]))
}

/// The object opening at the start of `text`, up to its matching brace.
/// Braces inside string literals do not count.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a model reply as JSON, tolerating fences and leading prose.
pub fn parse_json_reply(response: &str) -> Result<Value, LlmError> {
    let cleaned = sanitize_llm_output(response);
    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        return Ok(value);
    }
    let block = extract_json_block(&cleaned)
        .ok_or_else(|| LlmError::MalformedJson("no JSON object in reply".into()))?;
    serde_json::from_str(block).map_err(|e| LlmError::MalformedJson(e.to_string()))
}
