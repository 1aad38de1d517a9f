//! Parsing of language-model replies into JSON objects.
//!
//! Models asked for "a JSON array and nothing else" still wrap it in code
//! fences or add a sentence before it. Two attempts are made:
//!
//! 1. strip outer code fences and parse the whole reply as an array;
//! 2. try each bracket-balanced `[...]` substring in order (brackets inside
//!    string literals do not count) and keep the first that parses as an
//!    array.
//!
//! Array elements that are not objects are skipped.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => trimmed,
    }
}

/// Parse a reply into the objects of its JSON array.
///
/// # Errors
/// A short description of why neither attempt produced an array.
pub fn parse_reply(reply: &str) -> Result<Vec<Map<String, Value>>, String> {
    let body = strip_code_fences(reply);

    let value = match serde_json::from_str::<Value>(body) {
        Ok(v @ Value::Array(_)) => v,
        direct => {
            let direct_err = match direct {
                Ok(_) => "reply is JSON but not an array".to_string(),
                Err(e) => format!("reply contains no JSON array ({e})"),
            };
            extract_array(body).map_err(|e| e.unwrap_or(direct_err))?
        }
    };

    let items = match value {
        Value::Array(items) => items,
        _ => return Err("reply is JSON but not an array".into()),
    };

    let total = items.len();
    let objects: Vec<Map<String, Value>> = items
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(m) => Some(m),
            _ => None,
        })
        .collect();
    if objects.len() < total {
        debug!("Skipped {} non-object array elements", total - objects.len());
    }
    Ok(objects)
}

/// The first balanced `[...]` candidate that parses as a JSON array.
///
/// On failure returns the parse error of the last candidate, or `None` when
/// the text holds no balanced brackets at all.
fn extract_array(text: &str) -> Result<Value, Option<String>> {
    let mut last_err = None;
    for (start, _) in text.match_indices('[') {
        let Some(candidate) = balanced_array_at(text, start) else {
            continue;
        };
        match serde_json::from_str::<Value>(candidate) {
            Ok(v @ Value::Array(_)) => {
                debug!("Reply needed array extraction ({} chars)", candidate.len());
                return Ok(v);
            }
            Ok(_) => {}
            Err(e) => last_err = Some(format!("extracted array is not valid JSON: {e}")),
        }
    }
    Err(last_err)
}

/// The `[...]` substring opening at `start` whose brackets balance,
/// ignoring brackets inside JSON string literals.
fn balanced_array_at(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
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
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_array_parses() {
        let objs = parse_reply(r#"[{"item_id":"A1"},{"item_id":"B2"}]"#).unwrap();
        assert_eq!(objs.len(), 2);
        assert_eq!(objs[1]["item_id"], "B2");
    }

    #[test]
    fn fenced_array_parses() {
        let objs = parse_reply("```json\n[{\"item_id\":\"A1\"}]\n```").unwrap();
        assert_eq!(objs.len(), 1);
    }

    #[test]
    fn array_is_found_inside_prose() {
        let reply = r#"Here are the products: [{"item_id":"A1","name":"Tile [60x60]"}] Hope this helps!"#;
        let objs = parse_reply(reply).unwrap();
        assert_eq!(objs[0]["name"], "Tile [60x60]");
    }

    #[test]
    fn brackets_in_strings_do_not_close_the_array() {
        let text = r#"x ["a]\"]", "b"] y"#;
        assert_eq!(balanced_array_at(text, 2), Some(r#"["a]\"]", "b"]"#));
    }

    #[test]
    fn bracketed_prose_before_the_array_is_passed_over() {
        let reply = r#"Products found [2 items]: [{"item_id":"A1"},{"item_id":"B2"}]"#;
        let objs = parse_reply(reply).unwrap();
        assert_eq!(objs.len(), 2);
        assert_eq!(objs[0]["item_id"], "A1");
    }

    #[test]
    fn unbalanced_reply_is_an_error() {
        let err = parse_reply("I could not find [any products").unwrap_err();
        assert!(err.contains("no JSON array"), "got: {err}");
    }

    #[test]
    fn non_objects_are_skipped() {
        let objs = parse_reply(r#"[1, "two", {"item_id":"A1"}, null]"#).unwrap();
        assert_eq!(objs.len(), 1);
    }

    #[test]
    fn empty_array_is_ok() {
        assert!(parse_reply("[]").unwrap().is_empty());
    }

    #[test]
    fn prose_without_array_fails() {
        assert!(parse_reply("Sorry, I cannot help with that.").is_err());
        assert!(parse_reply(r#"{"item_id":"A1"}"#).is_err());
        assert!(parse_reply("[{\"item_id\": ").is_err());
    }
}
