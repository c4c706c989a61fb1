//! In-process source adapter for tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{SourceAdapter, SourceError, SourceQuery};
use crate::record::RawRecord;

/// What a [`MockSource`] does when searched.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Return these records, tagged with the mock's name.
    Records(Vec<RawRecord>),
    /// Fail with this error.
    Error(SourceError),
    /// Panic inside the adapter future.
    Panic(String),
}

/// A hand-rolled [`SourceAdapter`] returning a canned response.
///
/// Records are re-tagged with the mock's name unless they already carry a
/// source, so fixtures can also exercise untagged-record handling by setting
/// [`keep_source_tags`](MockSource::keep_source_tags).
pub struct MockSource {
    name: String,
    response: MockResponse,
    delay: Option<Duration>,
    keep_tags: bool,
    call_count: AtomicUsize,
    last_query: Mutex<Option<SourceQuery>>,
}

impl MockSource {
    pub fn new(name: impl Into<String>, response: MockResponse) -> Self {
        Self {
            name: name.into(),
            response,
            delay: None,
            keep_tags: false,
            call_count: AtomicUsize::new(0),
            last_query: Mutex::new(None),
        }
    }

    pub fn records(name: impl Into<String>, records: Vec<RawRecord>) -> Self {
        Self::new(name, MockResponse::Records(records))
    }

    pub fn failing(name: impl Into<String>, error: SourceError) -> Self {
        Self::new(name, MockResponse::Error(error))
    }

    pub fn panicking(name: impl Into<String>) -> Self {
        Self::new(name, MockResponse::Panic("mock source panicked".into()))
    }

    /// Set simulated network latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Return records exactly as given, without filling in the source tag.
    pub fn keep_source_tags(mut self) -> Self {
        self.keep_tags = true;
        self
    }

    /// How many times `search()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// The query passed to the most recent call.
    pub fn last_query(&self) -> Option<SourceQuery> {
        self.last_query.lock().ok().and_then(|q| q.clone())
    }
}

impl SourceAdapter for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn search<'a>(
        &'a self,
        query: &'a SourceQuery,
        _client: &'a reqwest::Client,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RawRecord>, SourceError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_query.lock() {
            *last = Some(query.clone());
        }

        Box::pin(async move {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            match &self.response {
                MockResponse::Records(records) => Ok(records
                    .iter()
                    .cloned()
                    .map(|mut r| {
                        if !self.keep_tags && r.source.is_empty() {
                            r.source = self.name.clone();
                        }
                        r
                    })
                    .collect()),
                MockResponse::Error(e) => Err(e.clone()),
                MockResponse::Panic(msg) => panic!("{}", msg),
            }
        })
    }
}
