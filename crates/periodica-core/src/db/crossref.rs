use super::{SourceAdapter, SourceError, SourceQuery, fetch_json, first_str, join_issns, str_at};
use crate::query::QUERY_DATE_FORMAT;
use crate::rate_limit::SourceLimiter;
use crate::record::RawRecord;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const BASE_URL: &str = "https://api.crossref.org/works";
const MAX_ROWS: usize = 100;

pub struct Crossref {
    mailto: Option<String>,
    limiter: SourceLimiter,
}

impl Crossref {
    /// Crossref allows a higher rate for clients identifying themselves with
    /// a contact address (the "polite pool").
    pub fn new(mailto: Option<String>) -> Self {
        let rate = if mailto.is_some() { 3 } else { 1 };
        Self {
            mailto,
            limiter: SourceLimiter::per_second(rate),
        }
    }
}

impl SourceAdapter for Crossref {
    fn name(&self) -> &str {
        "crossref"
    }

    fn search<'a>(
        &'a self,
        query: &'a SourceQuery,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RawRecord>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let mut filters = vec![
                format!("from-pub-date:{}", query.start_date.format(QUERY_DATE_FORMAT)),
                format!("until-pub-date:{}", query.end_date.format(QUERY_DATE_FORMAT)),
            ];
            filters.extend(query.issns().into_iter().map(|i| format!("issn:{}", i)));

            let mut params: Vec<(&str, String)> = vec![
                ("query.bibliographic", query.terms.clone()),
                ("rows", query.limit.min(MAX_ROWS).to_string()),
                ("sort", "relevance".into()),
                ("order", "desc".into()),
                ("filter", filters.join(",")),
            ];
            if !query.author.is_empty() {
                params.push(("query.author", query.author.clone()));
            }
            if let Some(ref email) = self.mailto {
                params.push(("mailto", email.clone()));
            }

            self.limiter.acquire().await;
            let data = fetch_json(client.get(BASE_URL).query(&params), timeout).await?;
            let items = data["message"]["items"]
                .as_array()
                .ok_or_else(|| SourceError::Parse("missing message.items".into()))?;

            let records: Vec<RawRecord> = items.iter().filter_map(parse_item).collect();
            tracing::debug!(source = "crossref", count = records.len(), "search complete");
            Ok(records)
        })
    }
}

/// Map one Crossref work onto a [`RawRecord`]. Items without a title are skipped.
pub fn parse_item(item: &serde_json::Value) -> Option<RawRecord> {
    let title = first_str(&item["title"]);
    if title.is_empty() {
        return None;
    }

    let authors: Vec<String> = item["author"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|a| {
                    let family = str_at(&a["family"]);
                    let given = str_at(&a["given"]);
                    match (family.is_empty(), given.is_empty()) {
                        (false, false) => Some(format!("{}, {}", family, given)),
                        (false, true) => Some(family),
                        (true, false) => Some(given),
                        (true, true) => {
                            let name = str_at(&a["name"]);
                            (!name.is_empty()).then_some(name)
                        }
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    Some(RawRecord {
        id: String::new(),
        title,
        authors: authors.join("; "),
        journal: first_str(&item["container-title"]),
        journal_id: join_issns(
            item["ISSN"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|v| v.as_str()),
        ),
        publication_date: publication_date(item),
        doi: str_at(&item["DOI"]),
        url: str_at(&item["URL"]),
        r#abstract: str_at(&item["abstract"]),
        source: "crossref".into(),
    })
}

/// First available date among `published`, `issued` and `created`, as
/// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
fn publication_date(item: &serde_json::Value) -> String {
    for field in ["published", "issued", "created"] {
        let parts: Vec<u64> = item[field]["date-parts"]
            .as_array()
            .and_then(|outer| outer.first())
            .and_then(|inner| inner.as_array())
            .map(|inner| inner.iter().filter_map(|p| p.as_u64()).collect())
            .unwrap_or_default();
        match parts.as_slice() {
            [y, m, d, ..] => return format!("{:04}-{:02}-{:02}", y, m, d),
            [y, m] => return format!("{:04}-{:02}", y, m),
            [y] => return format!("{:04}", y),
            [] => continue,
        }
    }
    String::new()
}
