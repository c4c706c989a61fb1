//! End-to-end tests for `SearchEngine` over mock sources and a temp cache dir.

use std::sync::Arc;
use std::time::Duration;

use periodica_core::db::mock::MockSource;
use periodica_core::{
    Config, RawRecord, SearchEngine, SearchRequest, SourceError, SourceRegistry, SourceStatus,
    ValidationError,
};

fn engine_in(dir: &std::path::Path, registry: SourceRegistry) -> SearchEngine {
    let config = Config {
        cache_dir: dir.to_path_buf(),
        cache_ttl_secs: 3600,
        ..Default::default()
    };
    SearchEngine::new(config, registry).unwrap()
}

fn raw(title: &str, doi: &str, date: &str) -> RawRecord {
    RawRecord {
        title: title.into(),
        doi: doi.into(),
        publication_date: date.into(),
        ..Default::default()
    }
}

fn year_2023(terms: &str) -> SearchRequest {
    SearchRequest {
        start_date: Some("2023-01-01".into()),
        end_date: Some("2023-12-31".into()),
        ..SearchRequest::new(terms)
    }
}

#[tokio::test]
async fn duplicate_doi_keeps_record_with_abstract() {
    let dir = tempfile::tempdir().unwrap();
    let mut with_abstract = raw("Targeted cancer therapy", "https://doi.org/10.1/X", "2023-05-10");
    with_abstract.r#abstract = "Tumours shrank.".into();
    let without_abstract = raw("Targeted Cancer Therapy", "10.1/X", "2023-05-10");

    let registry = SourceRegistry::new()
        .with(Arc::new(MockSource::records("alpha", vec![without_abstract])))
        .with(Arc::new(MockSource::records("beta", vec![with_abstract])));
    let engine = engine_in(dir.path(), registry);

    let results = engine.search(&year_2023("cancer AND therapy")).await.unwrap();
    let matching: Vec<_> = results
        .records
        .iter()
        .filter(|r| r.doi.eq_ignore_ascii_case("10.1/X"))
        .collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].r#abstract, "Tumours shrank.");
    assert_eq!(matching[0].url, "https://doi.org/10.1/X");
}

#[tokio::test]
async fn repeated_search_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MockSource::records(
        "alpha",
        vec![
            raw("First", "10.1/a", "2023-02-01"),
            raw("Second", "10.1/b", "2023-09-01"),
        ],
    ));
    let engine = engine_in(dir.path(), SourceRegistry::new().with(source.clone()));

    let first = engine.search(&year_2023("graphs")).await.unwrap();
    let second = engine.search(&year_2023("graphs")).await.unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.records, second.records);
    assert_eq!(source.call_count(), 1);
    assert_eq!(engine.cache().hits(), 1);
    assert_eq!(engine.cache().misses(), 1);
}

#[tokio::test]
async fn expired_entry_sends_the_query_to_sources_again() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MockSource::records(
        "alpha",
        vec![raw("Short lived", "10.1/t", "2023-05-01")],
    ));
    let config = Config {
        cache_dir: dir.path().to_path_buf(),
        cache_ttl_secs: 0,
        ..Default::default()
    };
    let engine = SearchEngine::new(config, SourceRegistry::new().with(source.clone())).unwrap();

    let first = engine.search(&year_2023("graphs")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = engine.search(&year_2023("graphs")).await.unwrap();

    assert!(!first.from_cache);
    assert!(!second.from_cache);
    assert_eq!(first.records, second.records);
    assert_eq!(source.call_count(), 2);
    assert_eq!(engine.cache().hits(), 0);
}

#[tokio::test]
async fn cache_survives_engine_restart() {
    let dir = tempfile::tempdir().unwrap();
    let first_source = Arc::new(MockSource::records(
        "alpha",
        vec![raw("Persisted", "10.1/p", "2023-03-01")],
    ));
    let engine = engine_in(dir.path(), SourceRegistry::new().with(first_source));
    engine.search(&year_2023("graphs")).await.unwrap();

    let second_source = Arc::new(MockSource::records("alpha", vec![]));
    let restarted = engine_in(dir.path(), SourceRegistry::new().with(second_source.clone()));
    let results = restarted.search(&year_2023("graphs")).await.unwrap();
    assert!(results.from_cache);
    assert_eq!(results.records[0].title, "Persisted");
    assert_eq!(second_source.call_count(), 0);
}

#[tokio::test]
async fn failing_and_panicking_sources_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SourceRegistry::new()
        .with(Arc::new(MockSource::failing(
            "down",
            SourceError::RateLimited { retry_after: None },
        )))
        .with(Arc::new(MockSource::panicking("broken")))
        .with(Arc::new(MockSource::records(
            "healthy",
            vec![raw("Survivor", "10.1/s", "2023-07-01")],
        )));
    let engine = engine_in(dir.path(), registry);

    let results = engine.search(&year_2023("graphs")).await.unwrap();
    assert_eq!(results.records.len(), 1);
    assert_eq!(results.records[0].title, "Survivor");

    let failed: Vec<_> = results
        .reports
        .iter()
        .filter(|r| r.status != SourceStatus::Ok)
        .map(|r| r.source.as_str())
        .collect();
    assert_eq!(failed, vec!["broken", "down"]);
}

#[tokio::test]
async fn total_outage_yields_empty_result() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SourceRegistry::new().with(Arc::new(MockSource::failing(
        "down",
        SourceError::Http("connection refused".into()),
    )));
    let engine = engine_in(dir.path(), registry);
    let results = engine.search(&year_2023("graphs")).await.unwrap();
    assert!(results.records.is_empty());
}

#[tokio::test]
async fn invalid_request_contacts_no_source() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MockSource::records("alpha", vec![]));
    let engine = engine_in(dir.path(), SourceRegistry::new().with(source.clone()));

    let inverted = SearchRequest {
        start_date: Some("2024-01-01".into()),
        end_date: Some("2023-01-01".into()),
        ..SearchRequest::new("graphs")
    };
    assert!(matches!(
        engine.search(&inverted).await,
        Err(ValidationError::InvertedRange { .. })
    ));

    let unknown = SearchRequest {
        sources: vec!["nowhere".into()],
        ..year_2023("graphs")
    };
    assert_eq!(
        engine.search(&unknown).await.unwrap_err(),
        ValidationError::UnknownSource("nowhere".into())
    );

    assert!(matches!(
        engine.search(&SearchRequest::new("")).await,
        Err(ValidationError::MissingTerms)
    ));
    assert_eq!(source.call_count(), 0);
}

#[tokio::test]
async fn output_is_valid_sorted_and_in_window() {
    let dir = tempfile::tempdir().unwrap();
    let mut url_only = raw("Preprint without DOI", "", "2023-08-15");
    url_only.url = "https://example.org/preprint".into();
    let records = vec![
        raw("Early", "10.1/e", "2023-01-02"),
        raw("", "10.1/untitled", "2023-04-01"),
        raw("No locator", "", "2023-04-01"),
        raw("Undated", "10.1/u", "sometime"),
        raw("Out of window", "10.1/o", "2022-12-31"),
        raw("Late", "10.1/l", "December 24, 2023"),
        url_only,
    ];
    let registry = SourceRegistry::new().with(Arc::new(MockSource::records("alpha", records)));
    let engine = engine_in(dir.path(), registry);

    let results = engine.search(&year_2023("graphs")).await.unwrap();
    let titles: Vec<&str> = results.records.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Late", "Preprint without DOI", "Early"]);

    for record in &results.records {
        assert!(!record.title.is_empty());
        assert!(!record.publication_date.is_empty());
        assert!(!record.doi.is_empty() || !record.url.is_empty());
    }
    let dates: Vec<&str> = results
        .records
        .iter()
        .map(|r| r.publication_date.as_str())
        .collect();
    assert!(dates.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn completion_order_does_not_affect_output() {
    let make_registry = |slow: &str| {
        let slow_first = slow == "alpha";
        let delay = |fast: bool| {
            if fast {
                Duration::from_millis(1)
            } else {
                Duration::from_millis(60)
            }
        };
        // Same title, no DOI, same date: fuzzy dedup keeps whichever is merged first.
        let mut a = raw("Shared finding", "", "2023-06-01");
        a.url = "https://alpha.example/1".into();
        let mut b = raw("Shared finding", "", "2023-06-01");
        b.url = "https://beta.example/1".into();
        SourceRegistry::new()
            .with(Arc::new(
                MockSource::records("alpha", vec![a]).with_delay(delay(!slow_first)),
            ))
            .with(Arc::new(
                MockSource::records("beta", vec![b]).with_delay(delay(slow_first)),
            ))
    };

    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let alpha_slow = engine_in(dir_a.path(), make_registry("alpha"))
        .search(&year_2023("graphs"))
        .await
        .unwrap();
    let beta_slow = engine_in(dir_b.path(), make_registry("beta"))
        .search(&year_2023("graphs"))
        .await
        .unwrap();

    assert_eq!(alpha_slow.records.len(), 1);
    assert_eq!(alpha_slow.records, beta_slow.records);
    assert_eq!(alpha_slow.records[0].source, "alpha");
}

#[tokio::test]
async fn disabled_sources_are_not_registered() {
    let config = Config {
        disabled_sources: vec!["crossref".into(), "openalex".into(), "semantic_scholar".into()],
        cache_dir: tempfile::tempdir().unwrap().path().to_path_buf(),
        ..Default::default()
    };
    let engine = SearchEngine::from_config(config).unwrap();
    let names: Vec<&str> = engine.registry().names().collect();
    assert_eq!(names, vec!["europe_pmc"]);

    let req = SearchRequest {
        sources: vec!["crossref".into()],
        ..year_2023("graphs")
    };
    assert!(matches!(
        engine.validate(&req),
        Err(ValidationError::UnknownSource(_))
    ));
}
