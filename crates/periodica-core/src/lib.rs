use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub mod cache;
pub mod config_file;
pub mod db;
pub mod matching;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod query;
pub mod rate_limit;
pub mod record;

// Re-export for convenience
pub use cache::{CacheError, ResultCache};
pub use db::{SourceAdapter, SourceError, SourceQuery, SourceRegistry};
pub use orchestrator::{SearchEngine, SearchResults, SourceReport, SourceStatus};
pub use query::{SearchQuery, SearchRequest, ValidationError};
pub use record::{NormalizedRecord, RawRecord, RecordError};

/// Failure to construct a [`SearchEngine`]. Searches themselves report
/// [`ValidationError`] and never fail on source or cache errors.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Runtime configuration for a [`SearchEngine`] and its [`ResultCache`].
#[derive(Clone)]
pub struct Config {
    /// Directory holding one JSON file per cached query.
    pub cache_dir: PathBuf,
    pub cache_ttl_secs: u64,
    /// How often the background sweeper evicts expired entries.
    pub cache_sweep_interval_secs: u64,
    /// Client-side timeout handed to every adapter call.
    pub source_timeout_secs: u64,
    /// Length of the default date window ending today.
    pub default_window_months: u32,
    pub default_limit: usize,
    pub max_limit: usize,
    /// Titles merge only when their similarity is strictly above this.
    pub fuzzy_title_threshold: f64,
    pub disabled_sources: Vec<String>,
    /// Contact address for Crossref's polite pool.
    pub crossref_mailto: Option<String>,
    pub openalex_mailto: Option<String>,
    pub s2_api_key: Option<String>,
}

impl Config {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs)
    }
}

/// Platform cache directory for periodica, or a temp-dir fallback.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("periodica")
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("cache_dir", &self.cache_dir)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("cache_sweep_interval_secs", &self.cache_sweep_interval_secs)
            .field("source_timeout_secs", &self.source_timeout_secs)
            .field("default_window_months", &self.default_window_months)
            .field("default_limit", &self.default_limit)
            .field("max_limit", &self.max_limit)
            .field("fuzzy_title_threshold", &self.fuzzy_title_threshold)
            .field("disabled_sources", &self.disabled_sources)
            .field(
                "crossref_mailto",
                &self.crossref_mailto.as_ref().map(|_| "***"),
            )
            .field(
                "openalex_mailto",
                &self.openalex_mailto.as_ref().map(|_| "***"),
            )
            .field("s2_api_key", &self.s2_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            cache_ttl_secs: 3600,
            cache_sweep_interval_secs: 600,
            source_timeout_secs: 30,
            default_window_months: 12,
            default_limit: 30,
            max_limit: 500,
            fuzzy_title_threshold: matching::DEFAULT_FUZZY_THRESHOLD,
            disabled_sources: vec![],
            crossref_mailto: None,
            openalex_mailto: None,
            s2_api_key: None,
        }
    }
}
