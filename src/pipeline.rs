use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, DiscoveryMode};
use crate::dates;
use crate::db::{EventCache, EventStore};
use crate::diagnostic::{Diagnostic, Stage};
use crate::extraction::{self, answer};
use crate::models::{
    DiscoveryDebug, DiscoveryRequest, DiscoveryResponse, ErrorBody, EventItem, EventSource,
    RawEventCandidate,
};
use crate::normalize;
use crate::oracle::{self, ExaClient, Oracle, SearchRequest};
use crate::relevance;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Configuration(String),
    #[error("Event discovery failed.")]
    Oracle(Diagnostic),
}

impl DiscoveryError {
    pub fn status(&self) -> u16 {
        match self {
            DiscoveryError::InvalidInput(_) => 400,
            DiscoveryError::Configuration(_) => 500,
            DiscoveryError::Oracle(_) => 502,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let details = match self {
            DiscoveryError::Oracle(diagnostic) => Some(diagnostic.message.clone()),
            _ => None,
        };
        ErrorBody {
            error: self.to_string(),
            details,
        }
    }
}

struct LiveBatch {
    query: String,
    results: usize,
    candidates: Vec<RawEventCandidate>,
}

pub struct Pipeline {
    config: AppConfig,
    oracle: Option<Arc<dyn Oracle>>,
    cache: Option<Arc<dyn EventCache>>,
}

impl Pipeline {
    pub fn new(
        config: AppConfig,
        oracle: Option<Arc<dyn Oracle>>,
        cache: Option<Arc<dyn EventCache>>,
    ) -> Self {
        Self {
            config,
            oracle,
            cache,
        }
    }

    /// Wires the Exa client and the shared SQLite cache. A cache that cannot be opened is
    /// logged and left out; a missing API key is reported when a request arrives.
    pub async fn from_config(config: AppConfig) -> Result<Self, DiscoveryError> {
        let oracle: Option<Arc<dyn Oracle>> = match ExaClient::from_config(&config) {
            None => None,
            Some(Ok(client)) => Some(Arc::new(client)),
            Some(Err(err)) => return Err(DiscoveryError::Configuration(err.to_string())),
        };

        let cache: Option<Arc<dyn EventCache>> = if config.cache_enabled {
            match EventStore::shared(config.database_path.clone()).await {
                Ok(store) => Some(store),
                Err(err) => {
                    warn!("event cache unavailable: {err}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self::new(config, oracle, cache))
    }

    pub async fn discover(
        &self,
        request: &DiscoveryRequest,
    ) -> Result<DiscoveryResponse, DiscoveryError> {
        self.discover_on(request, dates::today()).await
    }

    pub async fn discover_on(
        &self,
        request: &DiscoveryRequest,
        today: NaiveDate,
    ) -> Result<DiscoveryResponse, DiscoveryError> {
        let state = request.state.trim().to_uppercase();
        if state.is_empty() {
            return Err(DiscoveryError::InvalidInput("State is required.".to_string()));
        }
        let oracle = self.oracle.as_deref().ok_or_else(|| {
            DiscoveryError::Configuration(
                "Missing EXA_API_KEY. Set it in the environment or config.json.".to_string(),
            )
        })?;

        let (window_start, window_end) = dates::forward_window(today, self.config.window_months);
        let mut report = DiscoveryDebug::new(EventSource::Live, &window_start, &window_end);

        if let (Some(cache), false) = (&self.cache, request.force_refresh) {
            let cached = cache
                .read(&state, &window_start, &window_end)
                .await
                .map_err(|err| Diagnostic::new(Stage::CacheRead, err.to_string()));
            if let Some(cached) = settle(cached, &mut report.cache_error)? {
                if !cached.events.is_empty() {
                    info!("{state}: serving {} cached events", cached.events.len());
                    report.source = EventSource::Cache;
                    report.in_window = cached.events.len();
                    return Ok(DiscoveryResponse {
                        state,
                        fetched_at: cached.fetched_at,
                        events: cached.events,
                        debug: Some(report),
                    });
                }
                debug!("{state}: cache empty for {window_start}..{window_end}");
            }
        }

        let batch = self
            .live_candidates(oracle, &state, &window_start, &window_end, today)
            .await
            .map_err(DiscoveryError::Oracle)?;
        report.query = Some(batch.query);
        report.search_results = batch.results;
        report.extracted = batch.candidates.len();

        let (events, stats) = normalize::normalize_all(&batch.candidates, today);
        report.normalized = stats.accepted;
        let mut events = dedupe_by_source(events);
        report.deduplicated = events.len();
        events.retain(|event| {
            event.start_date.as_str() >= window_start.as_str()
                && event.start_date.as_str() <= window_end.as_str()
        });
        report.in_window = events.len();
        sort_events(&mut events);
        info!(
            "{state}: {} results, {} candidates, {} valid, {} in window",
            report.search_results, report.extracted, report.normalized, report.in_window
        );

        let profile = request
            .user_profile
            .as_deref()
            .map(str::trim)
            .filter(|profile| !profile.is_empty());
        if let Some(profile) = profile {
            let scores =
                relevance::score_relevance(oracle, &events, profile, self.config.max_scored).await;
            if let Some(scores) = settle(scores, &mut report.scoring_error)? {
                report.scored = relevance::apply_scores(&mut events, &scores);
            }
        }

        if let Some(cache) = &self.cache {
            let written = cache
                .upsert(&state, &events)
                .await
                .map_err(|err| Diagnostic::new(Stage::Persist, err.to_string()));
            if let Some(written) = settle(written, &mut report.persist_error)? {
                report.persisted = written;
            }
        }

        Ok(DiscoveryResponse {
            state,
            fetched_at: Utc::now(),
            events,
            debug: Some(report),
        })
    }

    async fn live_candidates(
        &self,
        oracle: &dyn Oracle,
        state: &str,
        window_start: &str,
        window_end: &str,
        today: NaiveDate,
    ) -> Result<LiveBatch, Diagnostic> {
        let oracle_failed =
            |err: oracle::OracleError| Diagnostic::new(Stage::Oracle, err.to_string());

        match self.config.mode {
            DiscoveryMode::Search => {
                let request = SearchRequest {
                    query: oracle::build_search_query(state),
                    num_results: self.config.num_results,
                    highlight_query: oracle::build_highlight_query(state),
                    text_max_characters: self.config.text_max_characters,
                    summary_schema: Some(extraction::summary_schema()),
                };
                let results = oracle::search_with_fallback(
                    oracle,
                    &request,
                    self.config.fallback_num_results,
                )
                .await
                .map_err(oracle_failed)?;
                Ok(LiveBatch {
                    query: request.query,
                    results: results.len(),
                    candidates: extraction::candidates_from_search(&results, today),
                })
            }
            DiscoveryMode::Answer => {
                let query = oracle::build_answer_query(state, window_start, window_end);
                let reply = oracle
                    .answer(&query, &answer::events_output_schema())
                    .await
                    .map_err(oracle_failed)?;
                let candidates = answer::candidates_from_answer(&reply);
                Ok(LiveBatch {
                    query,
                    results: candidates.len(),
                    candidates,
                })
            }
        }
    }
}

/// Fatal diagnostics end the request; advisory ones are logged, noted in `slot` and skipped.
fn settle<T>(
    result: Result<T, Diagnostic>,
    slot: &mut Option<String>,
) -> Result<Option<T>, DiscoveryError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(diagnostic) if diagnostic.is_fatal() => Err(DiscoveryError::Oracle(diagnostic)),
        Err(diagnostic) => {
            warn!("{diagnostic}");
            *slot = Some(diagnostic.message);
            Ok(None)
        }
    }
}

/// One event per source URL; a later duplicate replaces the earlier one in place.
fn dedupe_by_source(events: Vec<EventItem>) -> Vec<EventItem> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<EventItem> = Vec::with_capacity(events.len());
    for event in events {
        match positions.get(&event.source_url) {
            Some(&index) => unique[index] = event,
            None => {
                positions.insert(event.source_url.clone(), unique.len());
                unique.push(event);
            }
        }
    }
    unique
}

fn sort_events(events: &mut [EventItem]) {
    events.sort_by(|a, b| {
        a.start_date
            .cmp(&b.start_date)
            .then_with(|| a.name.cmp(&b.name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CachedEvents, StoreError};
    use crate::oracle::testing::ScriptedOracle;
    use crate::oracle::OracleError;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date")
    }

    fn pipeline(
        oracle: Arc<ScriptedOracle>,
        cache: Option<Arc<dyn EventCache>>,
        config: AppConfig,
    ) -> Pipeline {
        Pipeline::new(config, Some(oracle), cache)
    }

    fn hit(title: &str, url: Option<&str>, highlight: &str) -> Value {
        let mut result = json!({ "title": title, "highlights": [highlight] });
        if let Some(url) = url {
            result["url"] = json!(url);
        }
        result
    }

    fn stored_event(name: &str, start: &str, url: &str) -> EventItem {
        EventItem {
            name: name.to_string(),
            start_date: start.to_string(),
            end_date: None,
            location: "Seattle, WA".to_string(),
            target_audience: "all ages".to_string(),
            summary: "Cached summary.".to_string(),
            source_url: url.to_string(),
            image_url: None,
            relevance: None,
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl EventCache for BrokenCache {
        async fn read(&self, _: &str, _: &str, _: &str) -> Result<CachedEvents, StoreError> {
            Err(StoreError::Task("disk unavailable".to_string()))
        }

        async fn upsert(&self, _: &str, _: &[EventItem]) -> Result<usize, StoreError> {
            Err(StoreError::Task("read-only filesystem".to_string()))
        }
    }

    #[tokio::test]
    async fn past_month_name_lands_next_year_and_urlless_hits_are_dropped() {
        let oracle = Arc::new(ScriptedOracle::default().with_search(Ok(vec![
            hit(
                "Inland Northwest Comic Show",
                Some("https://inwcomics.example.com"),
                "Join us March 5 at the Convention Center, Spokane, WA",
            ),
            hit("Mystery Con", None, "Happening March 6 downtown"),
        ])));
        let p = pipeline(oracle.clone(), None, AppConfig::default());

        let response = p
            .discover_on(&DiscoveryRequest::new("wa"), today())
            .await
            .expect("discovery succeeds");

        assert_eq!(response.state, "WA");
        assert_eq!(response.events.len(), 1);
        let event = &response.events[0];
        assert_eq!(event.start_date, "2027-03-05");
        assert_eq!(event.location, "Spokane, WA");
        assert_eq!(event.source_url, "https://inwcomics.example.com");

        let report = response.debug.expect("debug");
        assert_eq!(report.source, EventSource::Live);
        assert_eq!(report.search_results, 2);
        assert_eq!(report.extracted, 2);
        assert_eq!(report.normalized, 1);

        let calls = oracle.search_calls.lock().expect("lock");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].num_results, 25);
        assert!(calls[0].query.contains("Washington (WA)"));
    }

    #[tokio::test]
    async fn filters_window_dedupes_and_sorts() {
        let oracle = Arc::new(ScriptedOracle::default().with_search(Ok(vec![
            hit("Zeta Fest", Some("https://z.example.com"), "On 2026-12-01 in Austin, TX"),
            hit("Alpha Con", Some("https://a.example.com"), "On 2026-12-01 in Dallas, TX"),
            hit("Old Name", Some("https://b.example.com"), "On 2026-11-01 in Houston, TX"),
            hit("New Name", Some("https://b.example.com"), "On 2026-11-02 in Houston, TX"),
            hit("Way Later", Some("https://c.example.com"), "On 2027-06-01 in El Paso, TX"),
            hit("Already Over", Some("https://d.example.com"), "On 2026-10-01 in Waco, TX"),
        ])));
        let p = pipeline(oracle, None, AppConfig::default());

        let response = p
            .discover_on(&DiscoveryRequest::new("TX"), today())
            .await
            .expect("discovery succeeds");
        let names: Vec<&str> = response.events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["New Name", "Alpha Con", "Zeta Fest"]);

        let report = response.debug.expect("debug");
        assert_eq!(report.normalized, 6);
        assert_eq!(report.deduplicated, 5);
        assert_eq!(report.in_window, 3);
    }

    #[tokio::test]
    async fn cache_hit_skips_the_oracle() {
        let store = Arc::new(EventStore::in_memory().expect("store"));
        store
            .upsert(
                "WA",
                &[stored_event("Cached Con", "2026-11-15", "https://cached.example.com")],
            )
            .await
            .expect("seed cache");
        let oracle = Arc::new(ScriptedOracle::default());
        let p = pipeline(oracle.clone(), Some(store), AppConfig::default());

        let response = p
            .discover_on(&DiscoveryRequest::new(" wa "), today())
            .await
            .expect("cache hit");
        assert_eq!(response.events.len(), 1);
        assert_eq!(response.events[0].name, "Cached Con");
        assert_eq!(response.debug.expect("debug").source, EventSource::Cache);
        assert_eq!(oracle.search_count(), 0);
    }

    #[tokio::test]
    async fn force_refresh_goes_live_and_persists() {
        let store = Arc::new(EventStore::in_memory().expect("store"));
        store
            .upsert(
                "OR",
                &[stored_event("Stale Con", "2026-11-15", "https://stale.example.com")],
            )
            .await
            .expect("seed cache");
        let oracle = Arc::new(ScriptedOracle::default().with_search(Ok(vec![hit(
            "Fresh Con",
            Some("https://fresh.example.com"),
            "December 12 at the Expo Center, Portland, OR",
        )])));
        let p = pipeline(oracle.clone(), Some(store.clone()), AppConfig::default());

        let request = DiscoveryRequest {
            state: "OR".to_string(),
            force_refresh: true,
            user_profile: None,
        };
        let response = p.discover_on(&request, today()).await.expect("live");
        assert_eq!(oracle.search_count(), 1);
        assert_eq!(response.events.len(), 1);
        assert_eq!(response.events[0].start_date, "2026-12-12");
        assert_eq!(response.debug.expect("debug").persisted, 1);

        let cached = store
            .read("OR", "2026-10-19", "2027-04-19")
            .await
            .expect("read back");
        let names: Vec<&str> = cached.events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Stale Con", "Fresh Con"]);
    }

    #[tokio::test]
    async fn empty_cache_falls_through_to_live() {
        let store = Arc::new(EventStore::in_memory().expect("store"));
        let oracle = Arc::new(ScriptedOracle::default().with_search(Ok(vec![hit(
            "Library Horror Night",
            Some("https://library.example.org/horror"),
            "2026-10-31 at Main Library, Salem, OR",
        )])));
        let p = pipeline(oracle.clone(), Some(store), AppConfig::default());

        let response = p
            .discover_on(&DiscoveryRequest::new("OR"), today())
            .await
            .expect("live");
        assert_eq!(oracle.search_count(), 1);
        assert_eq!(response.events.len(), 1);
    }

    #[tokio::test]
    async fn storage_failures_are_advisory() {
        let oracle = Arc::new(ScriptedOracle::default().with_search(Ok(vec![hit(
            "Book Bash",
            Some("https://bookbash.example.com"),
            "2026-11-20 at City Hall, Reno, NV",
        )])));
        let p = pipeline(oracle, Some(Arc::new(BrokenCache)), AppConfig::default());

        let response = p
            .discover_on(&DiscoveryRequest::new("NV"), today())
            .await
            .expect("storage errors do not fail discovery");
        assert_eq!(response.events.len(), 1);
        let report = response.debug.expect("debug");
        assert!(report.cache_error.expect("cache error").contains("disk unavailable"));
        assert!(report
            .persist_error
            .expect("persist error")
            .contains("read-only filesystem"));
        assert_eq!(report.persisted, 0);
    }

    #[tokio::test]
    async fn scoring_failure_keeps_events_unscored() {
        let oracle = Arc::new(
            ScriptedOracle::default()
                .with_search(Ok(vec![hit(
                    "Anime Day",
                    Some("https://animeday.example.com"),
                    "2026-11-08 at the Library, Provo, UT",
                )]))
                .with_answer(Err(OracleError::Parse("bad json".to_string()))),
        );
        let p = pipeline(oracle.clone(), None, AppConfig::default());

        let request = DiscoveryRequest {
            state: "UT".to_string(),
            force_refresh: false,
            user_profile: Some("manga fan".to_string()),
        };
        let response = p.discover_on(&request, today()).await.expect("live");
        assert_eq!(oracle.answer_count(), 1);
        assert_eq!(response.events[0].relevance, None);
        assert!(response.debug.expect("debug").scoring_error.is_some());
    }

    #[tokio::test]
    async fn scores_are_attached_when_profile_given() {
        let oracle = Arc::new(
            ScriptedOracle::default()
                .with_search(Ok(vec![
                    hit("B Event", Some("https://b.example.com"), "2026-11-02 in Mesa, AZ"),
                    hit("A Event", Some("https://a.example.com"), "2026-11-01 in Tempe, AZ"),
                ]))
                .with_answer(Ok(json!({"scores": [{"index": 0, "relevance": 9}]}))),
        );
        let p = pipeline(oracle, None, AppConfig::default());
        let request = DiscoveryRequest {
            state: "AZ".to_string(),
            force_refresh: false,
            user_profile: Some("cosplayer".to_string()),
        };
        let response = p.discover_on(&request, today()).await.expect("live");
        assert_eq!(response.events[0].name, "A Event");
        assert_eq!(response.events[0].relevance, Some(9));
        assert_eq!(response.events[1].relevance, None);
        assert_eq!(response.debug.expect("debug").scored, 1);
    }

    #[tokio::test]
    async fn rejects_blank_state_without_io() {
        let oracle = Arc::new(ScriptedOracle::default());
        let p = pipeline(oracle.clone(), Some(Arc::new(BrokenCache)), AppConfig::default());

        let err = p
            .discover_on(&DiscoveryRequest::new("   "), today())
            .await
            .expect_err("input error");
        assert!(matches!(err, DiscoveryError::InvalidInput(_)));
        assert_eq!(err.status(), 400);
        assert_eq!(err.body().error, "State is required.");
        assert_eq!(oracle.search_count(), 0);
    }

    #[tokio::test]
    async fn missing_oracle_is_a_configuration_error() {
        let p = Pipeline::new(AppConfig::default(), None, None);
        let err = p
            .discover_on(&DiscoveryRequest::new("CA"), today())
            .await
            .expect_err("configuration error");
        assert!(matches!(err, DiscoveryError::Configuration(_)));
        assert_eq!(err.status(), 500);
    }

    #[tokio::test]
    async fn oracle_failure_surfaces_with_details() {
        let oracle = Arc::new(ScriptedOracle::default().with_search(Err(OracleError::Status {
            status: 503,
            body: "upstream down".to_string(),
        })));
        let p = pipeline(oracle, None, AppConfig::default());

        let err = p
            .discover_on(&DiscoveryRequest::new("CA"), today())
            .await
            .expect_err("oracle error");
        assert_eq!(err.status(), 502);
        let body = err.body();
        assert_eq!(body.error, "Event discovery failed.");
        assert!(body.details.expect("details").contains("upstream down"));
    }

    #[tokio::test]
    async fn answer_mode_reads_structured_events() {
        let oracle = Arc::new(ScriptedOracle::default().with_answer(Ok(json!({
            "events": [
                {
                    "name": "Denver Pop Culture Con",
                    "startDate": "2027-01-09",
                    "endDate": "2027-01-09",
                    "location": "Colorado Convention Center, Denver, CO",
                    "targetAudience": "all ages",
                    "summary": "Comics, film and books.",
                    "sourceUrl": "https://denverpopculturecon.example.com"
                },
                { "name": "No Link Fair", "startDate": "2026-12-01" }
            ]
        }))));
        let config = AppConfig {
            mode: DiscoveryMode::Answer,
            ..AppConfig::default()
        };
        let p = pipeline(oracle.clone(), None, config);

        let response = p
            .discover_on(&DiscoveryRequest::new("co"), today())
            .await
            .expect("answer mode");
        assert_eq!(oracle.search_count(), 0);
        assert_eq!(response.events.len(), 1);
        assert_eq!(response.events[0].end_date, None);
        let query = oracle.answer_calls.lock().expect("lock")[0].clone();
        assert!(query.contains("between 2026-10-19 and 2027-04-19"));
    }
}
