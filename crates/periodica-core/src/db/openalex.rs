use super::{SourceAdapter, SourceError, SourceQuery, fetch_json, join_issns, str_at};
use crate::query::QUERY_DATE_FORMAT;
use crate::rate_limit::SourceLimiter;
use crate::record::RawRecord;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const BASE_URL: &str = "https://api.openalex.org/works";
const MAX_PER_PAGE: usize = 50;

pub struct OpenAlex {
    mailto: Option<String>,
    limiter: SourceLimiter,
}

impl OpenAlex {
    pub fn new(mailto: Option<String>) -> Self {
        Self {
            mailto,
            limiter: SourceLimiter::per_second(10),
        }
    }
}

impl SourceAdapter for OpenAlex {
    fn name(&self) -> &str {
        "openalex"
    }

    fn search<'a>(
        &'a self,
        query: &'a SourceQuery,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RawRecord>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let mut filters = vec![
                format!(
                    "from_publication_date:{}",
                    query.start_date.format(QUERY_DATE_FORMAT)
                ),
                format!(
                    "to_publication_date:{}",
                    query.end_date.format(QUERY_DATE_FORMAT)
                ),
            ];
            let issns = query.issns();
            if !issns.is_empty() {
                filters.push(format!("primary_location.source.issn:{}", issns.join("|")));
            }
            // OpenAlex filters authors by id only, so the name goes into the search.
            let search = if query.author.is_empty() {
                query.terms.clone()
            } else {
                format!("{} {}", query.terms, query.author.replace(',', ""))
            };

            let mut params: Vec<(&str, String)> = vec![
                ("search", search),
                ("per-page", query.limit.min(MAX_PER_PAGE).to_string()),
                ("filter", filters.join(",")),
            ];
            if let Some(ref email) = self.mailto {
                params.push(("mailto", email.clone()));
            }

            self.limiter.acquire().await;
            let data = fetch_json(client.get(BASE_URL).query(&params), timeout).await?;
            let results = data["results"]
                .as_array()
                .ok_or_else(|| SourceError::Parse("missing results".into()))?;

            let records: Vec<RawRecord> = results.iter().filter_map(parse_item).collect();
            tracing::debug!(source = "openalex", count = records.len(), "search complete");
            Ok(records)
        })
    }
}

/// Map one OpenAlex work onto a [`RawRecord`]. Items without a title are skipped.
pub fn parse_item(work: &serde_json::Value) -> Option<RawRecord> {
    let mut title = str_at(&work["title"]);
    if title.is_empty() {
        title = str_at(&work["display_name"]);
    }
    if title.is_empty() {
        return None;
    }

    let id = str_at(&work["id"])
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(|w| format!("openalex-{}", w))
        .unwrap_or_default();

    let authors: Vec<String> = work["authorships"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|a| str_at(&a["author"]["display_name"]))
                .filter(|n| !n.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let location = &work["primary_location"];
    let mut publication_date = str_at(&work["publication_date"]);
    if publication_date.is_empty()
        && let Some(year) = work["publication_year"].as_u64()
    {
        publication_date = year.to_string();
    }

    Some(RawRecord {
        id,
        title,
        authors: authors.join("; "),
        journal: str_at(&location["source"]["display_name"]),
        journal_id: join_issns(
            std::iter::once(str_at(&location["source"]["issn_l"])).chain(
                location["source"]["issn"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .map(str_at),
            ),
        ),
        publication_date,
        doi: str_at(&work["doi"]),
        url: str_at(&location["landing_page_url"]),
        r#abstract: rebuild_abstract(&work["abstract_inverted_index"]),
        source: "openalex".into(),
    })
}

/// Reassemble an abstract from OpenAlex's `{word: [positions]}` inverted index.
pub fn rebuild_abstract(index: &serde_json::Value) -> String {
    let Some(map) = index.as_object() else {
        return String::new();
    };
    let mut positioned: Vec<(u64, &str)> = map
        .iter()
        .flat_map(|(word, positions)| {
            positions
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|p| p.as_u64())
                .map(move |p| (p, word.as_str()))
        })
        .collect();
    positioned.sort_by_key(|(p, _)| *p);
    positioned
        .into_iter()
        .map(|(_, w)| w)
        .collect::<Vec<_>>()
        .join(" ")
}
