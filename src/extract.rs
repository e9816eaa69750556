//! Structured-output extraction
//!
//! Agents are asked for pure JSON but in practice return markdown fences,
//! leading prose, or truncated tails. Everything downstream goes through
//! the recovery functions here instead of ad hoc parsing per stage.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

/// Extract the first complete JSON object from a text blob.
///
/// Tries a whole-string parse first. On failure, scans forward for each
/// `{` and attempts to consume exactly one balanced object from there,
/// returning the first candidate that decodes successfully. A whole-string
/// parse that yields non-object JSON (bare array, string, number) returns
/// `None`: the callers of this module always expect an object.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => return Some(map),
        Ok(_) => return None,
        Err(_) => {}
    }

    for (start, ch) in text.char_indices() {
        if ch != '{' {
            continue;
        }
        if let Some(candidate) = balanced_object_span(&text[start..]) {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
                return Some(map);
            }
        }
    }

    debug!("no JSON object recovered from agent output");
    None
}

/// Consume one balanced `{...}` span from the start of `text`.
///
/// Braces inside quoted strings are ignored and backslash escapes are
/// respected, so argument values containing `{` do not mis-balance the
/// scan. Returns `None` when the object never closes (truncated output).
fn balanced_object_span(text: &str) -> Option<&str> {
    if !text.starts_with('{') {
        return None;
    }

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (idx, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..idx + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Interpret agent output as a JSON object, or wrap it as `{"raw": text}`.
///
/// Empty input yields an empty map. This mirrors what every stage does
/// with upstream output it cannot parse: keep the text, lose nothing.
pub fn json_or_raw(text: &str) -> Map<String, Value> {
    if text.trim().is_empty() {
        return Map::new();
    }

    if let Some(map) = extract_json_object(text) {
        return map;
    }

    let mut map = Map::new();
    map.insert("raw".to_string(), Value::String(text.to_string()));
    map
}

/// Parse-or-default combinator shared by the pipeline stages: extract +
/// deserialize, substituting `default()` on any failure. The second
/// element of the pair reports whether the fallback was used.
pub fn parse_or_default<T, F>(text: &str, default: F) -> (T, bool)
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    if let Some(map) = extract_json_object(text) {
        match serde_json::from_value::<T>(Value::Object(map)) {
            Ok(parsed) => return (parsed, false),
            Err(e) => debug!("extracted object did not match expected shape: {}", e),
        }
    }

    (default(), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json_round_trips() {
        let map = extract_json_object(r#"  {"x": 1, "y": "hai"}  "#).unwrap();
        assert_eq!(map.get("x"), Some(&json!(1)));
        assert_eq!(map.get("y"), Some(&json!("hai")));
    }

    #[test]
    fn test_markdown_fences_are_tolerated() {
        let text = "```json\n{\"product_details\": \"iPhone 15\", \"requires_inventory_check\": true}\n```";
        let map = extract_json_object(text).unwrap();
        assert_eq!(map.get("requires_inventory_check"), Some(&json!(true)));
    }

    #[test]
    fn test_surrounding_prose_is_tolerated() {
        let text = "Đây là kết quả phân tích:\n{\"customer_intent\": \"place_order\"}\nHết.";
        let map = extract_json_object(text).unwrap();
        assert_eq!(map.get("customer_intent"), Some(&json!("place_order")));
    }

    #[test]
    fn test_first_of_two_sibling_objects_wins() {
        let text = r#"{"first": 1} {"second": 2}"#;
        let map = extract_json_object(text).unwrap();
        assert!(map.contains_key("first"));
        assert!(!map.contains_key("second"));
    }

    #[test]
    fn test_brace_inside_quoted_string_does_not_misbalance() {
        let text = r#""a{b" {"x":1}"#;
        let map = extract_json_object(text).unwrap();
        assert_eq!(map.get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_nested_objects_return_outer() {
        let text = r#"result: {"outer": {"inner": 1}, "k": 2} trailing"#;
        let map = extract_json_object(text).unwrap();
        assert_eq!(map.get("k"), Some(&json!(2)));
        assert_eq!(map.get("outer"), Some(&json!({"inner": 1})));
    }

    #[test]
    fn test_escaped_quotes_inside_strings() {
        let text = r#"{"msg": "he said \"{\" rồi dừng", "n": 3}"#;
        let map = extract_json_object(text).unwrap();
        assert_eq!(map.get("n"), Some(&json!(3)));
    }

    #[test]
    fn test_truncated_object_fails() {
        assert!(extract_json_object(r#"{"x": 1, "y": "#).is_none());
    }

    #[test]
    fn test_bare_array_is_not_an_object() {
        assert!(extract_json_object(r#"[{"x": 1}]"#).is_none());
    }

    #[test]
    fn test_json_or_raw_falls_back_to_raw() {
        let map = json_or_raw("không phải JSON");
        assert_eq!(map.get("raw"), Some(&json!("không phải JSON")));

        assert!(json_or_raw("   ").is_empty());
    }

    #[test]
    fn test_parse_or_default_reports_fallback() {
        use crate::models::AnalysisResult;

        let (parsed, fallback) = parse_or_default::<AnalysisResult, _>(
            r#"{"product_details": "iPad", "requires_inventory_check": true}"#,
            AnalysisResult::default,
        );
        assert!(!fallback);
        assert_eq!(parsed.product_details, "iPad");

        let (parsed, fallback) = parse_or_default::<AnalysisResult, _>(
            "xin lỗi, tôi không chắc",
            || AnalysisResult::fallback_for("giá iPad?"),
        );
        assert!(fallback);
        assert!(!parsed.requires_inventory_check);
        assert_eq!(parsed.original_query, "giá iPad?");
    }
}
