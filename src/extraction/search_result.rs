use chrono::NaiveDate;
use serde_json::{Map, Value};

use super::base;
use crate::dates;
use crate::models::{
    RawEventCandidate, DEFAULT_AUDIENCE, DEFAULT_LOCATION, DEFAULT_SUMMARY, UNTITLED_EVENT,
};

const SUMMARY_HIGHLIGHTS: usize = 2;

/// Builds a candidate from one search hit. Structured summary fields win over page heuristics;
/// nothing here fails, missing data degrades to placeholders.
pub fn extract_candidate(result: &Value, today: NaiveDate) -> RawEventCandidate {
    let empty = Map::new();
    let record = result.as_object().unwrap_or(&empty);
    let structured = base::loose_object(record.get("summary")).unwrap_or_default();

    let highlights = base::highlight_list(record.get("highlights"));
    let highlights_text = highlights.join(" ");
    let body_text = base::value_text(record.get("text")).unwrap_or_default();

    let name = field(&structured, "name")
        .or_else(|| base::value_text(record.get("title")).map(|t| base::clean_text(&t)))
        .unwrap_or_else(|| UNTITLED_EVENT.to_string());

    // A source whose date will not resolve yields to the next one; the first raw value is kept
    // only when nothing resolves.
    let raw_dates = [
        field(&structured, "startDate"),
        dates::extract_first_date_candidate(&highlights_text),
        dates::extract_first_date_candidate(&body_text),
    ];
    let resolved = raw_dates
        .iter()
        .flatten()
        .find_map(|raw| dates::normalize_date_on(raw, today));
    let start_date = resolved.or_else(|| raw_dates.into_iter().flatten().next());

    let location = field(&structured, "location")
        .or_else(|| base::extract_location_candidate(&highlights_text))
        .or_else(|| base::extract_location_candidate(&body_text))
        .unwrap_or_else(|| DEFAULT_LOCATION.to_string());

    let summary = field(&structured, "summary")
        .or_else(|| {
            let joined = highlights
                .iter()
                .take(SUMMARY_HIGHLIGHTS)
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");
            Some(joined).filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_SUMMARY.to_string());

    let image_url =
        base::http_url(record.get("image")).or_else(|| base::http_url(record.get("favicon")));
    let source_url = base::value_text(record.get("url"))
        .or_else(|| base::value_text(record.get("id")))
        .filter(|url| base::is_http_url(url));

    RawEventCandidate {
        name: Some(name),
        start_date,
        end_date: field(&structured, "endDate"),
        location: Some(location),
        target_audience: Some(
            field(&structured, "targetAudience").unwrap_or_else(|| DEFAULT_AUDIENCE.to_string()),
        ),
        summary: Some(summary),
        source_url,
        image_url,
    }
}

fn field(structured: &Map<String, Value>, key: &str) -> Option<String> {
    base::value_text(structured.get(key))
}
