use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static HTTP_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://").expect("http url regex"));
static LOCATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Z][A-Za-z.'-]+(?:\s+[A-Z][A-Za-z.'-]+){0,3}),\s*([A-Z]{2})\b")
        .expect("location regex")
});

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_http_url(text: &str) -> bool {
    HTTP_URL_RE.is_match(text)
}

pub fn value_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

pub fn first_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| value_text(object.get(*key)))
}

pub fn http_url(value: Option<&Value>) -> Option<String> {
    value_text(value).filter(|url| is_http_url(url))
}

/// Highlights arrive either as a list of snippets or as one string.
pub fn highlight_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| value_text(Some(item)))
            .map(|item| clean_text(&item))
            .collect(),
        other => value_text(other)
            .map(|text| vec![clean_text(&text)])
            .unwrap_or_default(),
    }
}

pub fn extract_location_candidate(text: &str) -> Option<String> {
    let cleaned = clean_text(text);
    LOCATION_RE
        .captures(&cleaned)
        .map(|caps| format!("{}, {}", &caps[1], &caps[2]))
}

pub fn loose_object(value: Option<&Value>) -> Option<Map<String, Value>> {
    match value? {
        Value::Object(map) => Some(map.clone()),
        Value::String(text) => match serde_json::from_str::<Value>(text.trim()) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}
