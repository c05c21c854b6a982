//! JSON extraction from free-form text
//!
//! Agents wrap JSON in prose, code fences, or both. Extraction tries, in
//! order: a fenced `json` block, the widest bracketed span (first opening
//! bracket to last closing bracket), then every balanced span left to right.
//! Nothing here panics; total failure is `None` or an empty list.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)[ \t]*\r?\n(.*?)```").expect("valid regex"));

static BULLET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*•+]\s+|\d+[.)]\s*|\(\d+\)\s*|\[[ xX]\]\s*)+").expect("valid regex")
});

/// Minimum length for a line to survive the line-splitting fallback
pub const MIN_LINE_LEN: usize = 10;

/// Extract the first JSON array from `text`
///
/// Returns `None` when no bracketed span parses as a list.
#[must_use]
pub fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    candidates(text, '[', ']').find_map(|span| match serde_json::from_str::<Value>(span) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    })
}

/// Extract the first JSON object from `text`
#[must_use]
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    candidates(text, '{', '}').find_map(|span| match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    })
}

/// Extract a list of strings: JSON array first, line splitting second
///
/// Array items that are objects contribute their `text` / `requirement` /
/// `description` / `title` field.
#[must_use]
pub fn extract_string_list(text: &str) -> Vec<String> {
    if let Some(items) = extract_json_array(text) {
        let list = strings_from_values(&items);
        if !list.is_empty() {
            return list;
        }
    }
    split_lines(text)
}

/// Turn JSON values into trimmed, non-empty strings
#[must_use]
pub fn strings_from_values(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(map) => ["text", "requirement", "description", "title"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(|s| s.trim().to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Line-splitting fallback
///
/// Strips bullet and numeral markers, drops fence and bracket lines, keeps
/// lines longer than [`MIN_LINE_LEN`] characters.
#[must_use]
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| BULLET.replace(line, "").trim().to_string())
        .map(|line| {
            line.trim_matches(|c| c == '"' || c == ',')
                .trim()
                .to_string()
        })
        .filter(|line| !line.starts_with("```") && !line.starts_with('#'))
        .filter(|line| line.chars().count() > MIN_LINE_LEN)
        .collect()
}

/// Lenient string lookup over several candidate keys
#[must_use]
pub fn get_str<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Lenient rendering of any value as text (strings as-is, others as JSON)
#[must_use]
pub fn get_text(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match map.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Array(items)) if !items.is_empty() => Some(
            strings_from_values(items)
                .into_iter()
                .map(|s| format!("- {s}"))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        Some(v @ (Value::Object(_) | Value::Number(_) | Value::Bool(_))) => Some(v.to_string()),
        _ => None,
    })
}

/// Candidate spans in priority order
fn candidates<'a>(text: &'a str, open: char, close: char) -> impl Iterator<Item = &'a str> + 'a {
    let fenced = JSON_FENCE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(move |s| s.starts_with(open));

    let widest = text
        .find(open)
        .zip(text.rfind(close))
        .filter(|(start, end)| end > start)
        .map(|(start, end)| &text[start..=end]);

    fenced
        .chain(widest)
        .chain(BalancedSpans::new(text, open, close))
}

/// Balanced bracket spans honouring string literals
struct BalancedSpans<'a> {
    text: &'a str,
    pos: usize,
    open: char,
    close: char,
}

impl<'a> BalancedSpans<'a> {
    fn new(text: &'a str, open: char, close: char) -> Self {
        Self {
            text,
            pos: 0,
            open,
            close,
        }
    }
}

impl<'a> Iterator for BalancedSpans<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.text.len() {
            let rest = &self.text[self.pos..];
            let start = self.pos + rest.find(self.open)?;

            let mut depth = 0usize;
            let mut in_string = false;
            let mut escaped = false;
            let mut end = None;

            for (offset, ch) in self.text[start..].char_indices() {
                if in_string {
                    match ch {
                        _ if escaped => escaped = false,
                        '\\' => escaped = true,
                        '"' => in_string = false,
                        _ => {}
                    }
                    continue;
                }
                if ch == '"' {
                    in_string = true;
                } else if ch == self.open {
                    depth += 1;
                } else if ch == self.close {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(start + offset + ch.len_utf8());
                        break;
                    }
                }
            }

            // Resume just past this opening bracket so nested spans are tried too.
            self.pos = start + self.open.len_utf8();
            if let Some(end) = end {
                return Some(&self.text[start..end]);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn array_inside_prose() {
        let text = "Here you go:\n[\"Add a contact form\", \"Add a privacy page\"]\nThanks!";
        let items = extract_json_array(text).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn array_from_json_fence() {
        let text = "```json\n[\"one requirement here\"]\n```\n and later [broken";
        let items = extract_json_array(text).unwrap();
        assert_eq!(items[0], "one requirement here");
    }

    #[test]
    fn non_list_is_discarded() {
        assert!(extract_json_array("{\"a\": 1}").is_none());
        assert!(extract_json_array("no brackets at all").is_none());
    }

    #[test]
    fn widest_span_failure_falls_back_to_balanced() {
        let text = "first [\"a valid entry\"] then a stray ] bracket";
        let items = extract_json_array(text).unwrap();
        assert_eq!(items, vec![Value::String("a valid entry".into())]);
    }

    #[test]
    fn object_with_braces_inside_strings() {
        let text = "Result: {\"gap\": \"missing {curly} text\", \"complexity\": \"Low\"} done {";
        let map = extract_json_object(text).unwrap();
        assert_eq!(map["gap"], "missing {curly} text");
    }

    #[test]
    fn object_skips_unparseable_prefix() {
        let text = "{not json} and then {\"passed\": true}";
        let map = extract_json_object(text).unwrap();
        assert_eq!(map["passed"], true);
    }

    #[test]
    fn string_list_from_objects() {
        let text = r#"[{"text": "Add a contact form"}, {"requirement": "Add dark mode toggle"}, 3]"#;
        assert_eq!(
            extract_string_list(text),
            vec!["Add a contact form".to_string(), "Add dark mode toggle".to_string()]
        );
    }

    #[test]
    fn line_fallback_strips_markers() {
        let text = "Requirements:\n- Add a contact form with captcha\n2. Publish a privacy page\n* ok\n";
        assert_eq!(
            extract_string_list(text),
            vec![
                "Requirements:".to_string(),
                "Add a contact form with captcha".to_string(),
                "Publish a privacy page".to_string(),
            ]
        );
    }

    #[test]
    fn garbage_never_panics() {
        for text in ["", "[", "]", "{{{{", "\"[\"", "[\"unterminated", "é[ü]"] {
            let _ = extract_json_array(text);
            let _ = extract_json_object(text);
            let _ = extract_string_list(text);
        }
    }

    #[test]
    fn get_text_renders_lists() {
        let map = extract_json_object(r#"{"details": ["a step", "another step"]}"#).unwrap();
        assert_eq!(
            get_text(&map, &["details"]).unwrap(),
            "- a step\n- another step"
        );
    }
}
