//! Source adapter trait, shared HTTP plumbing, and the adapter registry.

pub mod crossref;
pub mod europe_pmc;
pub mod mock;
pub mod openalex;
pub mod semantic_scholar;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::Config;
use crate::normalize::{normalize_query_author, normalize_search_terms};
use crate::query::SearchQuery;
use crate::rate_limit::check_rate_limit_response;
use crate::record::RawRecord;

pub use crossref::Crossref;
pub use europe_pmc::EuropePmc;
pub use openalex::OpenAlex;
pub use semantic_scholar::SemanticScholar;

/// User agent sent by every HTTP adapter.
pub(crate) const USER_AGENT: &str = concat!("periodica/", env!("CARGO_PKG_VERSION"));

/// Error returned by a source adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("rate limited (429){}", .retry_after.map(|d| format!(", retry after {:.1}s", d.as_secs_f64())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("unexpected response: {0}")]
    Parse(String),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Parse(e.to_string())
        } else {
            SourceError::Http(e.to_string())
        }
    }
}

/// The query handed to every adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceQuery {
    /// Search terms with boolean operators preserved in upper case.
    pub terms: String,
    /// `"Surname, Given"`, or empty.
    pub author: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Journal filters (ISSNs or names) as given by the caller.
    pub journals: Vec<String>,
    pub limit: usize,
}

impl SourceQuery {
    pub fn from_query(query: &SearchQuery) -> Self {
        Self {
            terms: normalize_search_terms(&query.terms),
            author: normalize_query_author(&query.author),
            start_date: query.start_date,
            end_date: query.end_date,
            journals: query.journals.iter().cloned().collect(),
            limit: query.limit,
        }
    }

    /// The journal filters that look like ISSNs, for sources that filter on them.
    pub fn issns(&self) -> Vec<&str> {
        self.journals
            .iter()
            .map(String::as_str)
            .filter(|j| is_issn(j))
            .collect()
    }
}

static ISSN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{3}[\dXx]$").unwrap());

pub fn is_issn(value: &str) -> bool {
    ISSN.is_match(value.trim())
}

/// A bibliographic source that can be searched.
pub trait SourceAdapter: Send + Sync {
    /// Registry name of this source (e.g. `"crossref"`).
    fn name(&self) -> &str;

    /// Fetch raw records matching `query`. Every returned record is tagged with
    /// this adapter's name.
    fn search<'a>(
        &'a self,
        query: &'a SourceQuery,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RawRecord>, SourceError>> + Send + 'a>>;
}

/// Send a prepared GET and decode the JSON body, mapping 429 and other
/// non-success statuses to [`SourceError`].
pub(crate) async fn fetch_json(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<serde_json::Value, SourceError> {
    let resp = request
        .header("User-Agent", USER_AGENT)
        .timeout(timeout)
        .send()
        .await?;
    check_rate_limit_response(&resp)?;
    if !resp.status().is_success() {
        return Err(SourceError::Http(format!("HTTP {}", resp.status())));
    }
    resp.json()
        .await
        .map_err(|e| SourceError::Parse(e.to_string()))
}

/// String at `value`, or empty.
pub(crate) fn str_at(value: &serde_json::Value) -> String {
    value.as_str().unwrap_or_default().trim().to_string()
}

/// First string of a JSON array (Crossref wraps titles and journals in arrays).
pub(crate) fn first_str(value: &serde_json::Value) -> String {
    value
        .as_array()
        .and_then(|a| a.first())
        .map(str_at)
        .unwrap_or_default()
}

/// Every distinct ISSN in `values`, joined with `;` in first-seen order.
///
/// Journals carry a print and an electronic ISSN; keeping both lets the
/// journal filter match on either.
pub(crate) fn join_issns<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: Vec<String> = Vec::new();
    for value in values {
        let issn = value.as_ref().trim();
        if !issn.is_empty() && !seen.iter().any(|s| s.eq_ignore_ascii_case(issn)) {
            seen.push(issn.to_string());
        }
    }
    seen.join(";")
}

/// Adapters keyed by name; iteration is in name order.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four HTTP sources, minus any listed in `config.disabled_sources`.
    pub fn from_config(config: &Config) -> Self {
        let all: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(Crossref::new(config.crossref_mailto.clone())),
            Arc::new(OpenAlex::new(config.openalex_mailto.clone())),
            Arc::new(SemanticScholar::new(config.s2_api_key.clone())),
            Arc::new(EuropePmc::new()),
        ];
        let mut registry = Self::new();
        for adapter in all {
            let disabled = config
                .disabled_sources
                .iter()
                .any(|d| d.trim().eq_ignore_ascii_case(adapter.name()));
            if disabled {
                tracing::debug!(source = adapter.name(), "source disabled by config");
                continue;
            }
            registry.insert(adapter);
        }
        registry
    }

    /// Register `adapter` under its name, replacing any previous entry.
    pub fn insert(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.sources.insert(adapter.name().to_string(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.insert(adapter);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn SourceAdapter>> {
        self.sources.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
