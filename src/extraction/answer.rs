use serde_json::{json, Value};

use super::base;
use crate::models::RawEventCandidate;

pub fn events_output_schema() -> Value {
    json!({
        "type": "object",
        "required": ["events"],
        "additionalProperties": false,
        "properties": {
            "events": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "startDate", "location", "targetAudience", "summary", "sourceUrl"],
                    "additionalProperties": false,
                    "properties": {
                        "name": { "type": "string" },
                        "startDate": { "type": "string", "description": "YYYY-MM-DD" },
                        "endDate": { "type": "string", "description": "YYYY-MM-DD (optional)" },
                        "location": { "type": "string" },
                        "targetAudience": {
                            "type": "string",
                            "description": "e.g. all ages, families, kids, teens, adults"
                        },
                        "summary": { "type": "string", "description": "1-2 sentences" },
                        "sourceUrl": {
                            "type": "string",
                            "description": "A URL that supports the event details"
                        }
                    }
                }
            }
        }
    })
}

/// Candidates from a structured answer. Accepts `{ "events": [...] }`, a bare array, or either
/// one encoded as a JSON string.
pub fn candidates_from_answer(answer: &Value) -> Vec<RawEventCandidate> {
    entries(answer)
        .iter()
        .filter_map(Value::as_object)
        .map(|entry| RawEventCandidate {
            name: base::first_field(entry, &["name", "title"]),
            start_date: base::first_field(entry, &["startDate", "start_date"]),
            end_date: base::first_field(entry, &["endDate", "end_date"]),
            location: base::first_field(entry, &["location"]),
            target_audience: base::first_field(entry, &["targetAudience", "target_audience"]),
            summary: base::first_field(entry, &["summary"]),
            source_url: base::first_field(entry, &["sourceUrl", "source_url", "url"]),
            image_url: base::first_field(entry, &["imageUrl", "image_url"]),
        })
        .collect()
}

fn entries(answer: &Value) -> Vec<Value> {
    match answer {
        Value::Array(items) => items.clone(),
        Value::Object(map) => match map.get("events") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        },
        Value::String(text) => serde_json::from_str::<Value>(text.trim())
            .ok()
            .filter(|parsed| !parsed.is_string())
            .map(|parsed| entries(&parsed))
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}
