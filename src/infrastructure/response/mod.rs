use once_cell::sync::Lazy;
use regex::Regex;

static THINK_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<think>([\s\S]*?)</think>|<think\s*/>").unwrap());

static REASONING_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<reasoning>([\s\S]*?)</reasoning>").unwrap());

static INTERNAL_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<internal>[\s\S]*?</internal>").unwrap());

static MULTIPLE_NEWLINES_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Model answer split into its private reasoning and the visible response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OracleReply {
    pub reasoning: String,
    pub response: String,
}

/// Cleans LLM response by removing reasoning blocks and collapsing blank lines
pub fn clean_llm_response(response: &str) -> String {
    let mut cleaned = THINK_TAG_PATTERN.replace_all(response, "").to_string();
    cleaned = REASONING_TAG_PATTERN.replace_all(&cleaned, "").to_string();
    cleaned = INTERNAL_TAG_PATTERN.replace_all(&cleaned, "").to_string();

    let cleaned = cleaned.trim();

    MULTIPLE_NEWLINES_PATTERN
        .replace_all(cleaned, "\n\n")
        .to_string()
}

/// Separates `<think>`/`<reasoning>` content from the answer proper.
pub fn split_reasoning(raw: &str) -> OracleReply {
    let mut parts = Vec::new();
    for pattern in [&*THINK_TAG_PATTERN, &*REASONING_TAG_PATTERN] {
        for caps in pattern.captures_iter(raw) {
            if let Some(inner) = caps.get(1) {
                let text = inner.as_str().trim();
                if !text.is_empty() {
                    parts.push(text.to_string());
                }
            }
        }
    }

    OracleReply {
        reasoning: parts.join("\n\n"),
        response: clean_llm_response(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_think_tags() {
        let input = "<think>Some reasoning here</think>The actual response";
        assert_eq!(clean_llm_response(input), "The actual response");
    }

    #[test]
    fn test_clean_self_closing_think() {
        assert_eq!(clean_llm_response("<think />```sql\nSELECT 1\n```"), "```sql\nSELECT 1\n```");
    }

    #[test]
    fn test_clean_internal_tags() {
        let input = "<internal>Debug info</internal>Output";
        assert_eq!(clean_llm_response(input), "Output");
    }

    #[test]
    fn test_clean_multiple_newlines() {
        let input = "Line 1\n\n\n\n\nLine 2";
        assert_eq!(clean_llm_response(input), "Line 1\n\nLine 2");
    }

    #[test]
    fn test_split_reasoning() {
        let reply = split_reasoning(
            "<think>user wants orders</think>\n<reasoning>use orders table</reasoning>\nSure.",
        );
        assert_eq!(reply.reasoning, "user wants orders\n\nuse orders table");
        assert_eq!(reply.response, "Sure.");
    }

    #[test]
    fn test_split_without_reasoning() {
        let reply = split_reasoning("Plain answer with no tags.");
        assert_eq!(reply.reasoning, "");
        assert_eq!(reply.response, "Plain answer with no tags.");
    }
}
