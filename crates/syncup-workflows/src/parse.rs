//! Helpers for pulling structure out of free-form LLM replies.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("valid fence regex"))
}

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[-•*]+|\d+[.)])\s*").expect("valid bullet regex")
    })
}

/// Find a JSON document in an LLM reply.
///
/// Tries, in order: the whole reply, the first fenced code block, then the
/// span between the outermost `{`/`}` and `[`/`]`.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Some(v);
    }
    if let Some(body) = fence_re().captures(trimmed).and_then(|c| c.get(1)) {
        if let Ok(v) = serde_json::from_str(body.as_str().trim()) {
            return Some(v);
        }
    }
    [('{', '}'), ('[', ']')].iter().find_map(|&(open, close)| {
        let start = trimmed.find(open)?;
        let end = trimmed.rfind(close)?;
        if end <= start {
            return None;
        }
        serde_json::from_str(&trimmed[start..=end]).ok()
    })
}

/// Like [`extract_json`], but only accepts an object.
pub fn extract_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    match extract_json(text)? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Non-empty lines with bullets and list numbering stripped.
pub fn split_items(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| bullet_re().replace(line.trim(), "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Split a comma-separated list, dropping blanks.
pub fn split_csv(text: &str) -> Vec<String> {
    text.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
