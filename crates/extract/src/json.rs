//! Tolerant JSON body parsing for LLM responses.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

static FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("fence regex"));

/// Clip text to at most `limit` bytes on a char boundary, for prompt
/// budgets.
pub(crate) fn clip(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Parse a JSON payload out of a chat response, accepting fenced blocks
/// and leading prose. Returns `None` when nothing parses; callers treat
/// that as an abstention, not an error.
pub fn parse_json_body<T: DeserializeOwned>(body: &str) -> Option<T> {
    let candidate = FENCE
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or_else(|| body.trim());
    if let Ok(parsed) = serde_json::from_str(candidate) {
        return Some(parsed);
    }
    // Last resort: first '{' to last '}'.
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&body[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, PartialEq, Debug)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn parses_plain_and_fenced_json() {
        assert_eq!(parse_json_body::<Sample>(r#"{"value": 3}"#), Some(Sample { value: 3 }));
        assert_eq!(
            parse_json_body::<Sample>("Here you go:\n```json\n{\"value\": 7}\n```"),
            Some(Sample { value: 7 })
        );
    }

    #[test]
    fn prose_with_embedded_object_parses() {
        assert_eq!(
            parse_json_body::<Sample>("Sure! The result is {\"value\": 9} as requested."),
            Some(Sample { value: 9 })
        );
    }

    #[test]
    fn garbage_yields_none() {
        assert_eq!(parse_json_body::<Sample>("no json here"), None);
    }
}
