use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

fn is_json(candidate: &str) -> bool {
    serde_json::from_str::<Value>(candidate).is_ok()
}

/// Content of the first fenced block opened by `fence`.
fn fenced_block<'a>(text: &'a str, fence: &str) -> Option<&'a str> {
    let start = text.find(fence)? + fence.len();
    let end = text[start..].find("```")?;
    (end > 0).then(|| text[start..start + end].trim())
}

/// First brace-balanced object, ignoring braces inside strings.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(text[start..start + offset + 1].trim());
                }
            }
            _ => {}
        }
    }
    None
}

/// Recover a JSON object from free-form model output.
///
/// Tries, in order: a ```` ```json ```` fence, a bare ```` ``` ```` fence
/// (only when there is no json fence), the first brace-balanced object, and
/// finally the outermost `{...}` span with whitespace normalised. Returns
/// the input unchanged when nothing parses.
pub fn extract_json_from_text(text: &str) -> String {
    if text.is_empty() {
        tracing::warn!("Empty text provided for JSON extraction");
        return String::new();
    }

    let fence = if text.contains("```json") {
        Some("```json")
    } else if text.contains("```") {
        Some("```")
    } else {
        None
    };
    if let Some(block) = fence.and_then(|f| fenced_block(text, f)) {
        if is_json(block) {
            return block.to_string();
        }
        tracing::debug!("Code block content is not valid JSON, trying other strategies");
    }

    if let Some(candidate) = balanced_object(text) {
        if is_json(candidate) {
            return candidate.to_string();
        }
        tracing::debug!("Balanced object failed to parse, trying normalisation");
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            let span = &text[start..=end];
            if is_json(span) {
                return span.to_string();
            }

            let joined = span.lines().map(str::trim).collect::<Vec<_>>().join(" ");
            if is_json(&joined) {
                return joined;
            }

            let collapsed = WHITESPACE_RUN.replace_all(span, " ").into_owned();
            if is_json(&collapsed) {
                return collapsed;
            }
        }
    }

    tracing::warn!("Could not extract valid JSON, returning original text");
    text.to_string()
}

/// Parse a model response into an assessment mapping.
/// `None` when no JSON object can be recovered.
pub fn parse_assessment(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(&extract_json_from_text(text)) {
        Ok(Value::Object(map)) => Some(map),
        Ok(other) => {
            tracing::warn!(kind = json_kind(&other), "Assessment response is not a JSON object");
            None
        }
        Err(_) => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
