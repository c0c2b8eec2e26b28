//! Extraction of fenced blocks and JSON payloads from oracle responses.

use once_cell::sync::Lazy;
use regex::Regex;

static SQL_BLOCK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```sql\s*(.*?)\s*```").unwrap());

static JSON_BLOCK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```json\s*(.*?)\s*```").unwrap());

// Any fence (optionally json-tagged) wrapping a brace-delimited object.
static OBJECT_BLOCK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```(?:json)?\s*(\{.*?\})\s*```").unwrap());

static BRACE_TRIM_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^[^{]*(\{.*\})[^}]*$").unwrap());

/// Pattern matching the block fenced with ```` ```<tag> ````. Tag match is
/// case-insensitive; the body is capture group 1.
pub(crate) fn tagged_block_pattern(tag: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?is)```{}\s*(.*?)\s*```", regex::escape(tag)))
}

/// Trimmed body of the first block `pattern` matches.
pub(crate) fn extract_block(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// First fenced `sql` block.
pub(crate) fn extract_sql_block(text: &str) -> Option<String> {
    extract_block(&SQL_BLOCK_PATTERN, text).filter(|sql| !sql.is_empty())
}

/// Drops anything before the first `{` and after the last `}`. Text without
/// a brace pair is returned trimmed.
pub(crate) fn strip_to_braces(text: &str) -> String {
    let trimmed = text.trim();
    BRACE_TRIM_PATTERN
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Parse the auditor's answer: a fenced `json` block if present, otherwise
/// the raw response, trimmed to its outermost braces.
pub(crate) fn parse_json_reply<T: serde::de::DeserializeOwned>(
    response: &str,
) -> std::result::Result<T, serde_json::Error> {
    let body = JSON_BLOCK_PATTERN
        .captures(response)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(response);
    serde_json::from_str(&strip_to_braces(body))
}

/// Parse a summarizer answer: any fenced object block first, then the whole
/// response trimmed to its outermost braces.
pub(crate) fn parse_object_reply<T: serde::de::DeserializeOwned>(
    response: &str,
) -> std::result::Result<T, serde_json::Error> {
    if let Some(block) = OBJECT_BLOCK_PATTERN
        .captures(response)
        .and_then(|caps| caps.get(1))
    {
        if let Ok(value) = serde_json::from_str(block.as_str()) {
            return Ok(value);
        }
    }
    serde_json::from_str(&strip_to_braces(response))
}
