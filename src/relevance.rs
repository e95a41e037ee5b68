use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::debug;

use crate::diagnostic::{Diagnostic, Stage};
use crate::models::EventItem;
use crate::oracle::Oracle;

pub const MAX_SCORED: usize = 25;

pub async fn score_relevance(
    oracle: &dyn Oracle,
    events: &[EventItem],
    user_profile: &str,
    max_scored: usize,
) -> Result<HashMap<usize, u8>, Diagnostic> {
    let profile = user_profile.trim();
    let batch = &events[..events.len().min(max_scored)];
    if profile.is_empty() || batch.is_empty() {
        return Ok(HashMap::new());
    }

    let query = build_prompt(batch, profile);
    let answer = oracle
        .answer(&query, &output_schema())
        .await
        .map_err(|err| Diagnostic::new(Stage::Scoring, err.to_string()))?;

    let scores = parse_scores(&answer, batch.len())
        .ok_or_else(|| Diagnostic::new(Stage::Scoring, "answer did not contain a score list"))?;
    debug!("scored {} of {} events", scores.len(), batch.len());
    Ok(scores)
}

pub fn apply_scores(events: &mut [EventItem], scores: &HashMap<usize, u8>) -> usize {
    let mut applied = 0;
    for (index, event) in events.iter_mut().enumerate() {
        if let Some(score) = scores.get(&index) {
            event.relevance = Some(*score);
            applied += 1;
        }
    }
    applied
}

fn output_schema() -> Value {
    json!({
        "type": "object",
        "required": ["scores"],
        "additionalProperties": false,
        "properties": {
            "scores": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["index", "relevance"],
                    "additionalProperties": false,
                    "properties": {
                        "index": { "type": "integer" },
                        "relevance": { "type": "integer", "minimum": 1, "maximum": 10 }
                    }
                }
            }
        }
    })
}

fn build_prompt(batch: &[EventItem], profile: &str) -> String {
    let listing = batch
        .iter()
        .enumerate()
        .map(|(index, event)| {
            json!({
                "index": index,
                "url": event.source_url,
                "name": event.name,
                "dates": match &event.end_date {
                    Some(end) => format!("{} to {}", event.start_date, end),
                    None => event.start_date.clone(),
                },
                "location": event.location,
                "audience": event.target_audience,
                "summary": event.summary,
            })
        })
        .collect::<Vec<_>>();
    let listing_json = serde_json::to_string_pretty(&listing).unwrap_or_default();

    format!(
        "Rate how relevant each event is to this person on a scale of 1 (not relevant) to 10 (a must-attend).\n\nABOUT THE PERSON:\n{profile}\n\nEVENTS:\n{listing_json}\n\nRules:\n- Return one entry per event with its index and an integer relevance.\n- Judge only from the details given; when unsure, use a middle score (5).\n- Do not invent events or indices.\n"
    )
}

/// Lenient read of the score list. Out-of-range indices are dropped, relevance is rounded and
/// clamped.
fn parse_scores(answer: &Value, batch_len: usize) -> Option<HashMap<usize, u8>> {
    let entries = score_entries(answer)?;
    let mut scores = HashMap::new();
    for entry in entries.iter().filter_map(Value::as_object) {
        let index = entry.get("index").and_then(number);
        let relevance = entry.get("relevance").and_then(number);
        let (Some(index), Some(relevance)) = (index, relevance) else {
            continue;
        };
        if index < 0.0 || index.fract() != 0.0 || index >= batch_len as f64 {
            continue;
        }
        let score = relevance.round().clamp(1.0, 10.0) as u8;
        scores.insert(index as usize, score);
    }
    Some(scores)
}

fn score_entries(answer: &Value) -> Option<Vec<Value>> {
    match answer {
        Value::Array(items) => Some(items.clone()),
        Value::Object(map) => ["scores", "results", "events"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array).cloned()),
        Value::String(text) => serde_json::from_str::<Value>(text.trim())
            .ok()
            .filter(|parsed| !parsed.is_string())
            .and_then(|parsed| score_entries(&parsed)),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}
