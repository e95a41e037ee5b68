use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils;

pub const DEFAULT_EXA_BASE_URL: &str = "https://api.exa.ai";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    #[default]
    Search,
    Answer,
}

impl std::str::FromStr for DiscoveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "search" => Ok(Self::Search),
            "answer" => Ok(Self::Answer),
            other => Err(format!("unknown discovery mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub exa_api_key: Option<String>,
    pub exa_base_url: String,
    pub database_path: PathBuf,
    pub cache_enabled: bool,
    pub num_results: u32,
    pub fallback_num_results: u32,
    pub text_max_characters: u32,
    pub window_months: u32,
    pub max_scored: usize,
    pub mode: DiscoveryMode,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exa_api_key: None,
            exa_base_url: DEFAULT_EXA_BASE_URL.to_string(),
            database_path: utils::database_path(),
            cache_enabled: true,
            num_results: 25,
            fallback_num_results: 10,
            text_max_characters: 4000,
            window_months: 6,
            max_scored: 25,
            mode: DiscoveryMode::Search,
            request_timeout_secs: 60,
        }
    }
}

impl AppConfig {
    /// Config file in the data directory (if any), then environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_from(&utils::config_path());
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    pub fn load_from(path: &Path) -> Self {
        match read_config(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("ignoring unreadable config {:?}: {err}", path);
                Self::default()
            }
        }
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = non_empty("EXA_API_KEY") {
            self.exa_api_key = Some(key);
        }
        if let Some(url) = non_empty("EXA_BASE_URL") {
            self.exa_base_url = url;
        }
        if let Some(path) = non_empty("EVENTS_DB_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(flag) = non_empty("EVENTS_CACHE") {
            self.cache_enabled = !matches!(flag.to_lowercase().as_str(), "off" | "0" | "false");
        }
        if let Some(n) = non_empty("EXA_NUM_RESULTS").and_then(|v| v.parse::<u32>().ok()) {
            self.num_results = n;
        }
        if let Some(mode) = non_empty("EVENTS_DISCOVERY_MODE").and_then(|v| v.parse().ok()) {
            self.mode = mode;
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.exa_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

fn read_config(path: &Path) -> Result<AppConfig, String> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|err| err.to_string())?;
    serde_json::from_str(&contents).map_err(|err| err.to_string())
}
