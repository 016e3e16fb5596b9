use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

pub const DEFAULT_NEWSAPI_BASE_URL: &str = "https://newsapi.org/v2/";
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 500;
pub const DEFAULT_MAX_SOURCES: usize = 20;
/// Upstream ceiling for `pageSize`.
pub const MAX_PAGE_SIZE: u32 = 100;
/// The upstream only searches the last month of articles.
pub const MAX_WINDOW_HOURS: i64 = 31 * 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    pub newsapi_key: Option<String>,

    #[serde(default = "default_newsapi_base_url")]
    pub newsapi_base_url: String,

    #[serde(default = "default_fetch_interval")]
    pub fetch_interval_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub ingest: IngestLimits,

    #[serde(default)]
    pub default_seed: DefaultSeed,
}

/// Tunables for query construction in the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestLimits {
    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
}

/// Preferences given to every newly registered user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefaultSeed {
    #[serde(default = "default_seed_countries")]
    pub countries: Vec<String>,
    #[serde(default = "default_seed_sources")]
    pub sources: Vec<String>,
    #[serde(default = "default_seed_keywords")]
    pub keywords: Vec<String>,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("newsfeed");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("newsfeed.db").to_string_lossy().to_string()
}

fn default_newsapi_base_url() -> String {
    DEFAULT_NEWSAPI_BASE_URL.to_string()
}

fn default_fetch_interval() -> u64 {
    600
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_query_length() -> usize {
    DEFAULT_MAX_QUERY_LENGTH
}

fn default_max_sources() -> usize {
    DEFAULT_MAX_SOURCES
}

fn default_page_size() -> u32 {
    100
}

fn default_window_hours() -> i64 {
    24
}

fn default_seed_countries() -> Vec<String> {
    vec!["nz".to_string()]
}

fn default_seed_sources() -> Vec<String> {
    vec!["bbc-news".to_string(), "cnn".to_string()]
}

pub fn default_seed_keywords() -> Vec<String> {
    vec!["car".to_string(), "automobile".to_string()]
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            max_query_length: default_max_query_length(),
            max_sources: default_max_sources(),
            page_size: default_page_size(),
            window_hours: default_window_hours(),
        }
    }
}

impl IngestLimits {
    pub fn validate(&self) -> Result<()> {
        if self.max_query_length == 0 {
            return Err(AppError::Config("ingest.max_query_length must be positive".into()));
        }
        if self.max_sources == 0 {
            return Err(AppError::Config("ingest.max_sources must be positive".into()));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(AppError::Config(format!(
                "ingest.page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if !(1..=MAX_WINDOW_HOURS).contains(&self.window_hours) {
            return Err(AppError::Config(format!(
                "ingest.window_hours must be between 1 and {MAX_WINDOW_HOURS}, got {}",
                self.window_hours
            )));
        }
        Ok(())
    }
}

impl Default for DefaultSeed {
    fn default() -> Self {
        Self {
            countries: default_seed_countries(),
            sources: default_seed_sources(),
            keywords: default_seed_keywords(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            newsapi_key: None,
            newsapi_base_url: default_newsapi_base_url(),
            fetch_interval_secs: default_fetch_interval(),
            request_timeout_secs: default_request_timeout(),
            ingest: IngestLimits::default(),
            default_seed: DefaultSeed::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Read the config at `path`, writing the defaults there first if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch_interval_secs == 0 {
            return Err(AppError::Config("fetch_interval_secs must be positive".into()));
        }
        self.ingest.validate()
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("newsfeed")
            .join("config.toml")
    }

    /// The API key, treating a blank value the same as an absent one.
    pub fn api_key(&self) -> Option<&str> {
        self.newsapi_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }
}
