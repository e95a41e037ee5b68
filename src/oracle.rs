use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::states;

const EXCLUDED_DOMAINS: [&str; 9] = [
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "linkedin.com",
    "youtube.com",
    "youtu.be",
    "pinterest.com",
];

const HIGHLIGHT_SENTENCES: u32 = 2;
const HIGHLIGHTS_PER_URL: u32 = 4;

static RESULT_LIMIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)numresults|max\s*10|basic plan").expect("result limit regex"));

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Http(String),
    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("oracle response unreadable: {0}")]
    Parse(String),
}

impl OracleError {
    /// Plan limits on `numResults` are reported as plain error text.
    pub fn is_result_limit(&self) -> bool {
        RESULT_LIMIT_RE.is_match(&self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub num_results: u32,
    pub highlight_query: String,
    pub text_max_characters: u32,
    pub summary_schema: Option<Value>,
}

#[async_trait]
pub trait Oracle: Send + Sync {
    async fn search_and_contents(&self, request: &SearchRequest)
        -> Result<Vec<Value>, OracleError>;

    async fn answer(&self, query: &str, output_schema: &Value) -> Result<Value, OracleError>;
}

/// Runs the search once and, on a result-count limit error only, once more with `fallback`
/// results.
pub async fn search_with_fallback(
    oracle: &dyn Oracle,
    request: &SearchRequest,
    fallback: u32,
) -> Result<Vec<Value>, OracleError> {
    match oracle.search_and_contents(request).await {
        Ok(results) => Ok(results),
        Err(err) if err.is_result_limit() && request.num_results > fallback => {
            warn!(
                "search rejected numResults={}, retrying with {fallback}: {err}",
                request.num_results
            );
            let smaller = SearchRequest {
                num_results: fallback,
                ..request.clone()
            };
            oracle.search_and_contents(&smaller).await
        }
        Err(err) => Err(err),
    }
}

pub fn build_search_query(state: &str) -> String {
    let s = states::display(state);
    [
        format!("Find upcoming events in {} ({}), USA.", s.name, s.code),
        "Focus on book fairs/festivals, comic cons/conventions, pop culture conventions, author readings/signings/talks, library events, and horror festivals.".to_string(),
        "Include dates and locations (venue + city/state).".to_string(),
    ]
    .join(" ")
}

pub fn build_highlight_query(state: &str) -> String {
    let s = states::display(state);
    format!(
        "event date time location address venue city state {} {} book fair book festival author reading library event horror festival horror con",
        s.code, s.name
    )
}

pub fn build_answer_query(state: &str, window_start: &str, window_end: &str) -> String {
    let s = states::display(state);
    [
        format!(
            "Find as many upcoming events as possible in {} ({}), USA related to comics, fandom, books and horror.",
            s.name, s.code
        ),
        "Include both big and small/local events.".to_string(),
        "Treat these as relevant: comic con, comic convention, comic book show, pop culture convention, fan expo, anime convention, sci-fi convention, fantasy convention, gaming convention, tabletop convention, manga/anime festival, geek fest, collectibles/toy show, artist alley events, book fairs/festivals, author readings/signings, library events, and horror festivals/cons.".to_string(),
        format!("Return only events happening between {window_start} and {window_end}."),
        "Use real sources (official event pages or reputable listings). Include a sourceUrl for each event.".to_string(),
        "If an event spans multiple days, set startDate and endDate. Otherwise set only startDate.".to_string(),
        "TargetAudience should be a short label like \"all ages\", \"families\", \"adults\", \"kids\", \"teens\".".to_string(),
        "Keep summaries concise. Return many results if available (aim for 20-40).".to_string(),
    ]
    .join(" ")
}

pub struct ExaClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl ExaClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("event-scout/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| OracleError::Http(err.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &AppConfig) -> Option<Result<Self, OracleError>> {
        let key = config.api_key()?;
        Some(Self::new(
            &config.exa_base_url,
            key,
            Duration::from_secs(config.request_timeout_secs),
        ))
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<Value, OracleError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|err| OracleError::Http(err.to_string()))?;

        let status = response.status();
        let text_body = response
            .text()
            .await
            .map_err(|err| OracleError::Http(err.to_string()))?;

        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
                body: text_body,
            });
        }

        serde_json::from_str(&text_body).map_err(|err| OracleError::Parse(err.to_string()))
    }
}

#[async_trait]
impl Oracle for ExaClient {
    async fn search_and_contents(
        &self,
        request: &SearchRequest,
    ) -> Result<Vec<Value>, OracleError> {
        let mut contents = json!({
            "text": { "maxCharacters": request.text_max_characters },
            "highlights": {
                "query": request.highlight_query,
                "numSentences": HIGHLIGHT_SENTENCES,
                "highlightsPerUrl": HIGHLIGHTS_PER_URL,
            },
        });
        if let Some(schema) = &request.summary_schema {
            contents["summary"] = json!({
                "query": "Extract the event this page describes.",
                "schema": schema,
            });
        }

        let payload = json!({
            "query": request.query,
            "type": "auto",
            "numResults": request.num_results,
            "userLocation": "US",
            "excludeDomains": EXCLUDED_DOMAINS,
            "contents": contents,
        });

        let body = self.post("search", &payload).await?;
        let results = match body.get("results") {
            Some(Value::Array(results)) => results.clone(),
            _ => Vec::new(),
        };
        debug!("search returned {} results", results.len());
        Ok(results)
    }

    async fn answer(&self, query: &str, output_schema: &Value) -> Result<Value, OracleError> {
        let payload = json!({
            "query": query,
            "text": true,
            "outputSchema": output_schema,
        });
        let body = self.post("answer", &payload).await?;
        body.get("answer")
            .cloned()
            .ok_or_else(|| OracleError::Parse("answer response missing `answer`".to_string()))
    }
}
