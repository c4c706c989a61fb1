use crate::cache::ResultCache;
use crate::db::{SourceQuery, SourceRegistry};
use crate::pipeline::{self, PipelineOptions};
use crate::query::{SearchQuery, SearchRequest, ValidationError};
use crate::record::{NormalizedRecord, RawRecord};
use crate::{Config, CoreError};
use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of one source within a fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    /// The adapter returned an error.
    Failed,
    /// The adapter task panicked.
    Panicked,
}

/// Per-source diagnostics for a fan-out. Never affects result ordering.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub status: SourceStatus,
    /// Raw records returned (0 on failure).
    pub records: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub error: Option<String>,
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Final output of a search, paired with the query that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: SearchQuery,
    pub records: Vec<NormalizedRecord>,
    pub from_cache: bool,
    /// Empty when served from cache.
    pub reports: Vec<SourceReport>,
}

/// Federated search over a registry of sources, with a result cache.
pub struct SearchEngine {
    registry: SourceRegistry,
    cache: Arc<ResultCache>,
    config: Arc<Config>,
    client: reqwest::Client,
}

impl SearchEngine {
    pub fn new(config: Config, registry: SourceRegistry) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::db::USER_AGENT)
            .build()?;
        let cache = Arc::new(ResultCache::new(
            config.cache_dir.clone(),
            config.cache_ttl(),
        ));
        Ok(Self {
            registry,
            cache,
            config: Arc::new(config),
            client,
        })
    }

    /// Engine over the built-in HTTP sources.
    pub fn from_config(config: Config) -> Result<Self, CoreError> {
        let registry = SourceRegistry::from_config(&config);
        Self::new(config, registry)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Validate `request` against today's date and the registered sources.
    pub fn validate(&self, request: &SearchRequest) -> Result<SearchQuery, ValidationError> {
        self.validate_at(request, chrono::Local::now().date_naive())
    }

    pub fn validate_at(
        &self,
        request: &SearchRequest,
        today: NaiveDate,
    ) -> Result<SearchQuery, ValidationError> {
        request.validate(&self.config, self.registry.names(), today)
    }

    /// Validate and run a search. Validation errors are returned before any
    /// source is contacted; source failures only shrink the result.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResults, ValidationError> {
        let query = self.validate(request)?;
        Ok(self.run(query).await)
    }

    /// Run an already-validated query.
    pub async fn run(&self, query: SearchQuery) -> SearchResults {
        let key = query.cache_key();
        tracing::info!(terms = %query.terms, key = %key, sources = query.sources.len(), "search started");

        if let Some(records) = self.cache.get(&key) {
            return SearchResults {
                query,
                records,
                from_cache: true,
                reports: vec![],
            };
        }

        let (raw, reports) = self.fan_out(&query).await;
        let options = PipelineOptions {
            fuzzy_threshold: self.config.fuzzy_title_threshold,
        };
        let mut records = pipeline::process(raw, &query, &options);
        records.truncate(query.limit);
        self.cache.insert(&key, &records);

        let failed = reports
            .iter()
            .filter(|r| r.status != SourceStatus::Ok)
            .count();
        tracing::info!(key = %key, count = records.len(), failed, "search finished");

        SearchResults {
            query,
            records,
            from_cache: false,
            reports,
        }
    }

    /// Query every selected source concurrently, one task per source.
    ///
    /// Per-source lists are concatenated in source-name order regardless of
    /// completion order.
    async fn fan_out(&self, query: &SearchQuery) -> (Vec<RawRecord>, Vec<SourceReport>) {
        let source_query = Arc::new(SourceQuery::from_query(query));
        let timeout = self.config.source_timeout();
        let mut join_set = tokio::task::JoinSet::new();
        let mut tasks: HashMap<tokio::task::Id, (String, Instant)> = HashMap::new();

        for name in &query.sources {
            let Some(adapter) = self.registry.get(name) else {
                tracing::warn!(source = %name, "selected source is not registered");
                continue;
            };
            let adapter = Arc::clone(adapter);
            let source_query = Arc::clone(&source_query);
            let client = self.client.clone();
            let handle = join_set.spawn(async move {
                adapter.search(&source_query, &client, timeout).await
            });
            tasks.insert(handle.id(), (name.clone(), Instant::now()));
        }

        let mut per_source: BTreeMap<String, Vec<RawRecord>> = BTreeMap::new();
        let mut reports: BTreeMap<String, SourceReport> = BTreeMap::new();

        while let Some(joined) = join_set.join_next_with_id().await {
            let id = match &joined {
                Ok((id, _)) => *id,
                Err(e) => e.id(),
            };
            let Some((name, started)) = tasks.remove(&id) else {
                continue;
            };
            let elapsed = started.elapsed();

            let report = match joined {
                Ok((_, Ok(records))) => {
                    tracing::debug!(source = %name, count = records.len(), ?elapsed, "source finished");
                    let report = SourceReport {
                        source: name.clone(),
                        status: SourceStatus::Ok,
                        records: records.len(),
                        elapsed,
                        error: None,
                    };
                    per_source.insert(name.clone(), records);
                    report
                }
                Ok((_, Err(e))) => {
                    tracing::warn!(source = %name, error = %e, "source failed");
                    SourceReport {
                        source: name.clone(),
                        status: SourceStatus::Failed,
                        records: 0,
                        elapsed,
                        error: Some(e.to_string()),
                    }
                }
                Err(e) => {
                    tracing::warn!(source = %name, error = %e, "source task panicked");
                    SourceReport {
                        source: name.clone(),
                        status: SourceStatus::Panicked,
                        records: 0,
                        elapsed,
                        error: Some(e.to_string()),
                    }
                }
            };
            reports.insert(name, report);
        }

        let raw = per_source.into_values().flatten().collect();
        (raw, reports.into_values().collect())
    }
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock::MockSource;
    use crate::db::SourceError;

    fn engine(dir: &std::path::Path, registry: SourceRegistry) -> SearchEngine {
        let config = Config {
            cache_dir: dir.to_path_buf(),
            ..Default::default()
        };
        SearchEngine::new(config, registry).unwrap()
    }

    fn record(title: &str, doi: &str) -> RawRecord {
        RawRecord {
            title: title.into(),
            doi: doi.into(),
            publication_date: "2023-06-01".into(),
            ..Default::default()
        }
    }

    fn request() -> SearchRequest {
        SearchRequest {
            start_date: Some("2023-01-01".into()),
            end_date: Some("2023-12-31".into()),
            ..SearchRequest::new("graphs")
        }
    }

    #[tokio::test]
    async fn reports_cover_every_selected_source() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SourceRegistry::new()
            .with(Arc::new(MockSource::records("b", vec![record("One", "10.1/1")])))
            .with(Arc::new(MockSource::failing(
                "a",
                SourceError::Http("HTTP 503".into()),
            )))
            .with(Arc::new(MockSource::panicking("c")));
        let engine = engine(dir.path(), registry);

        let results = engine.search(&request()).await.unwrap();
        assert!(!results.from_cache);
        assert_eq!(results.records.len(), 1);

        let statuses: Vec<(&str, SourceStatus)> = results
            .reports
            .iter()
            .map(|r| (r.source.as_str(), r.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("a", SourceStatus::Failed),
                ("b", SourceStatus::Ok),
                ("c", SourceStatus::Panicked),
            ]
        );
        assert_eq!(results.reports[0].error.as_deref(), Some("HTTP error: HTTP 503"));
    }

    #[tokio::test]
    async fn only_selected_sources_are_queried() {
        let dir = tempfile::tempdir().unwrap();
        let a = Arc::new(MockSource::records("a", vec![record("One", "10.1/1")]));
        let b = Arc::new(MockSource::records("b", vec![record("Two", "10.1/2")]));
        let registry = SourceRegistry::new().with(a.clone()).with(b.clone());
        let engine = engine(dir.path(), registry);

        let req = SearchRequest {
            sources: vec!["b".into()],
            ..request()
        };
        let results = engine.search(&req).await.unwrap();
        assert_eq!(results.records.len(), 1);
        assert_eq!(a.call_count(), 0);
        assert_eq!(b.call_count(), 1);
    }

    #[tokio::test]
    async fn limit_truncates_after_sorting() {
        let dir = tempfile::tempdir().unwrap();
        let mut older = record("Older", "10.1/1");
        older.publication_date = "2023-02-01".into();
        let mut newer = record("Newer", "10.1/2");
        newer.publication_date = "2023-11-01".into();
        let registry =
            SourceRegistry::new().with(Arc::new(MockSource::records("a", vec![older, newer])));
        let engine = engine(dir.path(), registry);

        let req = SearchRequest {
            limit: Some(1),
            ..request()
        };
        let results = engine.search(&req).await.unwrap();
        assert_eq!(results.records.len(), 1);
        assert_eq!(results.records[0].title, "Newer");
    }

    #[tokio::test]
    async fn adapters_receive_normalized_query() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockSource::records("a", vec![]));
        let engine = engine(dir.path(), SourceRegistry::new().with(mock.clone()));

        let req = SearchRequest {
            terms: " cancer   AND therapy ".into(),
            author: Some("Marie Curie".into()),
            limit: Some(7),
            ..request()
        };
        engine.search(&req).await.unwrap();
        let seen = mock.last_query().unwrap();
        assert_eq!(seen.terms, "cancer AND therapy");
        assert_eq!(seen.author, "Curie, Marie");
        assert_eq!(seen.limit, 7);
    }
}
