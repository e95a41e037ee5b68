use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNTITLED_EVENT: &str = "Untitled event";
pub const DEFAULT_LOCATION: &str = "See source for address.";
pub const DEFAULT_AUDIENCE: &str = "all ages";
pub const DEFAULT_SUMMARY: &str = "See source for details.";

/// A validated event. Only `normalize::normalize_on` builds these from untrusted input.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventItem {
    pub name: String,
    pub start_date: String, // YYYY-MM-DD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    pub location: String,
    pub target_audience: String,
    pub summary: String,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<u8>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawEventCandidate {
    pub name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub location: Option<String>,
    pub target_audience: Option<String>,
    pub summary: Option<String>,
    pub source_url: Option<String>,
    pub image_url: Option<String>,
}

impl From<&EventItem> for RawEventCandidate {
    fn from(event: &EventItem) -> Self {
        Self {
            name: Some(event.name.clone()),
            start_date: Some(event.start_date.clone()),
            end_date: event.end_date.clone(),
            location: Some(event.location.clone()),
            target_audience: Some(event.target_audience.clone()),
            summary: Some(event.summary.clone()),
            source_url: Some(event.source_url.clone()),
            image_url: event.image_url.clone(),
        }
    }
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRequest {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default)]
    pub user_profile: Option<String>,
}

impl DiscoveryRequest {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            ..Self::default()
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Cache,
    Live,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResponse {
    pub state: String,
    pub fetched_at: DateTime<Utc>,
    pub events: Vec<EventItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DiscoveryDebug>,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryDebug {
    pub source: EventSource,
    pub window_start: String,
    pub window_end: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub search_results: usize,
    pub extracted: usize,
    pub normalized: usize,
    pub deduplicated: usize,
    pub in_window: usize,
    pub scored: usize,
    pub persisted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring_error: Option<String>,
}

impl DiscoveryDebug {
    pub fn new(source: EventSource, window_start: &str, window_end: &str) -> Self {
        Self {
            source,
            window_start: window_start.to_string(),
            window_end: window_end.to_string(),
            query: None,
            search_results: 0,
            extracted: 0,
            normalized: 0,
            deduplicated: 0,
            in_window: 0,
            scored: 0,
            persisted: 0,
            cache_error: None,
            persist_error: None,
            scoring_error: None,
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_camel_case_without_empty_optionals() {
        let event = EventItem {
            name: "Comic Fest".to_string(),
            start_date: "2026-11-01".to_string(),
            end_date: None,
            location: "Boise, ID".to_string(),
            target_audience: DEFAULT_AUDIENCE.to_string(),
            summary: DEFAULT_SUMMARY.to_string(),
            source_url: "https://comicfest.example.com".to_string(),
            image_url: None,
            relevance: None,
        };
        let value = serde_json::to_value(&event).expect("serialize event");
        assert_eq!(value["startDate"], "2026-11-01");
        assert_eq!(value["sourceUrl"], "https://comicfest.example.com");
        assert!(value.get("endDate").is_none());
        assert!(value.get("relevance").is_none());
    }

    #[test]
    fn request_accepts_partial_json() {
        let request: DiscoveryRequest =
            serde_json::from_str(r#"{"state":"ca","userProfile":"likes horror"}"#)
                .expect("parse request");
        assert_eq!(request.state, "ca");
        assert!(!request.force_refresh);
        assert_eq!(request.user_profile.as_deref(), Some("likes horror"));
    }
}
