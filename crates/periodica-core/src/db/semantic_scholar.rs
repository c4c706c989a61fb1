use super::{SourceAdapter, SourceError, SourceQuery, fetch_json, str_at};
use crate::query::QUERY_DATE_FORMAT;
use crate::rate_limit::SourceLimiter;
use crate::record::RawRecord;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const SEARCH_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
const MAX_LIMIT: usize = 100;
const FIELDS: &str = "title,authors,venue,journal,year,publicationDate,externalIds,url,abstract";

pub struct SemanticScholar {
    api_key: Option<String>,
    limiter: SourceLimiter,
}

impl SemanticScholar {
    /// Keyless access is limited to roughly one request every three seconds.
    pub fn new(api_key: Option<String>) -> Self {
        let limiter = if api_key.is_some() {
            SourceLimiter::per_second(1)
        } else {
            SourceLimiter::new(Duration::from_secs(3))
        };
        Self { api_key, limiter }
    }
}

impl SourceAdapter for SemanticScholar {
    fn name(&self) -> &str {
        "semantic_scholar"
    }

    fn search<'a>(
        &'a self,
        query: &'a SourceQuery,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RawRecord>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let search = if query.author.is_empty() {
                query.terms.clone()
            } else {
                format!("{} {}", query.terms, query.author.replace(',', ""))
            };
            let params: Vec<(&str, String)> = vec![
                ("query", search),
                ("limit", query.limit.min(MAX_LIMIT).to_string()),
                ("fields", FIELDS.into()),
                (
                    "publicationDateOrYear",
                    format!(
                        "{}:{}",
                        query.start_date.format(QUERY_DATE_FORMAT),
                        query.end_date.format(QUERY_DATE_FORMAT)
                    ),
                ),
            ];

            let mut request = client
                .get(SEARCH_URL)
                .query(&params)
                .header("Accept", "application/json");
            if let Some(ref key) = self.api_key {
                request = request.header("x-api-key", key);
            }

            self.limiter.acquire().await;
            let data = fetch_json(request, timeout).await?;
            // An empty result page omits `data` entirely.
            let records: Vec<RawRecord> = data["data"]
                .as_array()
                .map(|papers| papers.iter().filter_map(parse_item).collect())
                .unwrap_or_default();
            tracing::debug!(
                source = "semantic_scholar",
                count = records.len(),
                "search complete"
            );
            Ok(records)
        })
    }
}

/// Map one Semantic Scholar paper onto a [`RawRecord`].
pub fn parse_item(paper: &serde_json::Value) -> Option<RawRecord> {
    let title = str_at(&paper["title"]);
    if title.is_empty() {
        return None;
    }

    let paper_id = str_at(&paper["paperId"]);
    let authors: Vec<String> = paper["authors"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|a| str_at(&a["name"]))
                .filter(|n| !n.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let mut journal = str_at(&paper["journal"]["name"]);
    if journal.is_empty() {
        journal = str_at(&paper["venue"]);
    }

    let mut publication_date = str_at(&paper["publicationDate"]);
    if publication_date.is_empty()
        && let Some(year) = paper["year"].as_u64()
    {
        publication_date = year.to_string();
    }

    Some(RawRecord {
        id: if paper_id.is_empty() {
            String::new()
        } else {
            format!("semantic-{}", paper_id)
        },
        title,
        authors: authors.join("; "),
        journal,
        journal_id: String::new(),
        publication_date,
        doi: str_at(&paper["externalIds"]["DOI"]),
        url: str_at(&paper["url"]),
        r#abstract: str_at(&paper["abstract"]),
        source: "semantic_scholar".into(),
    })
}
