use chrono::NaiveDate;

use crate::dates;
use crate::extraction::base::is_http_url;
use crate::models::{
    EventItem, RawEventCandidate, DEFAULT_AUDIENCE, DEFAULT_LOCATION, DEFAULT_SUMMARY,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeStats {
    pub accepted: usize,
    pub rejected: usize,
}

pub fn normalize(candidate: &RawEventCandidate) -> Option<EventItem> {
    normalize_on(candidate, dates::today())
}

/// The only way untrusted fields become an [`EventItem`]. Either every invariant holds or the
/// candidate is dropped.
pub fn normalize_on(candidate: &RawEventCandidate, today: NaiveDate) -> Option<EventItem> {
    let name = trimmed(&candidate.name)?;
    let source_url = trimmed(&candidate.source_url).filter(|url| is_http_url(url))?;
    let start_date = trimmed(&candidate.start_date)
        .and_then(|raw| dates::normalize_date_on(&raw, today))?;

    let end_date = trimmed(&candidate.end_date)
        .and_then(|raw| dates::normalize_date_on(&raw, today))
        .filter(|end| *end != start_date);

    Some(EventItem {
        name,
        start_date,
        end_date,
        location: trimmed(&candidate.location).unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
        target_audience: trimmed(&candidate.target_audience)
            .unwrap_or_else(|| DEFAULT_AUDIENCE.to_string()),
        summary: trimmed(&candidate.summary).unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
        source_url,
        image_url: trimmed(&candidate.image_url).filter(|url| is_http_url(url)),
        relevance: None,
    })
}

pub fn normalize_all(
    candidates: &[RawEventCandidate],
    today: NaiveDate,
) -> (Vec<EventItem>, NormalizeStats) {
    let mut stats = NormalizeStats::default();
    let mut events = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match normalize_on(candidate, today) {
            Some(event) => {
                stats.accepted += 1;
                events.push(event);
            }
            None => stats.rejected += 1,
        }
    }
    (events, stats)
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
