use super::{SourceAdapter, SourceError, SourceQuery, fetch_json, join_issns, str_at};
use crate::query::QUERY_DATE_FORMAT;
use crate::rate_limit::SourceLimiter;
use crate::record::RawRecord;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const SEARCH_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest/search";
const MAX_PAGE_SIZE: usize = 100;

pub struct EuropePmc {
    limiter: SourceLimiter,
}

impl EuropePmc {
    pub fn new() -> Self {
        Self {
            limiter: SourceLimiter::per_second(2),
        }
    }
}

impl Default for EuropePmc {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a Europe PMC query string. Date, author and journal constraints are
/// expressed in the query language itself.
pub fn build_query(query: &SourceQuery) -> String {
    let mut clauses = vec![
        format!("({})", query.terms),
        format!(
            "FIRST_PDATE:[{} TO {}]",
            query.start_date.format(QUERY_DATE_FORMAT),
            query.end_date.format(QUERY_DATE_FORMAT)
        ),
    ];
    if !query.author.is_empty() {
        let surname = query.author.split(',').next().unwrap_or_default().trim();
        clauses.push(format!("AUTH:\"{}\"", surname));
    }
    if !query.journals.is_empty() {
        let journals: Vec<String> = query
            .journals
            .iter()
            .map(|j| {
                if super::is_issn(j) {
                    format!("ISSN:\"{}\"", j.trim())
                } else {
                    format!("JOURNAL:\"{}\"", j.trim())
                }
            })
            .collect();
        clauses.push(format!("({})", journals.join(" OR ")));
    }
    clauses.join(" AND ")
}

impl SourceAdapter for EuropePmc {
    fn name(&self) -> &str {
        "europe_pmc"
    }

    fn search<'a>(
        &'a self,
        query: &'a SourceQuery,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RawRecord>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let params: Vec<(&str, String)> = vec![
                ("query", build_query(query)),
                ("format", "json".into()),
                ("resultType", "core".into()),
                ("pageSize", query.limit.min(MAX_PAGE_SIZE).to_string()),
            ];

            self.limiter.acquire().await;
            let data = fetch_json(client.get(SEARCH_URL).query(&params), timeout).await?;
            let results = data["resultList"]["result"]
                .as_array()
                .ok_or_else(|| SourceError::Parse("missing resultList.result".into()))?;

            let records: Vec<RawRecord> = results.iter().filter_map(parse_item).collect();
            tracing::debug!(source = "europe_pmc", count = records.len(), "search complete");
            Ok(records)
        })
    }
}

/// Map one Europe PMC result onto a [`RawRecord`].
pub fn parse_item(item: &serde_json::Value) -> Option<RawRecord> {
    let title = str_at(&item["title"]);
    if title.is_empty() {
        return None;
    }

    let id = str_at(&item["id"]);
    let origin = str_at(&item["source"]);
    let doi = str_at(&item["doi"]);

    // "Smith J, Doe A." -> one entry per comma-separated name
    let authors: Vec<String> = str_at(&item["authorString"])
        .split(',')
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();

    let journal = &item["journalInfo"]["journal"];
    let journal_id = join_issns([str_at(&journal["issn"]), str_at(&journal["essn"])]);

    let mut publication_date = str_at(&item["firstPublicationDate"]);
    if publication_date.is_empty() {
        publication_date = str_at(&item["pubYear"]);
    }

    let url = if doi.is_empty() && !id.is_empty() && !origin.is_empty() {
        format!("https://europepmc.org/article/{}/{}", origin, id)
    } else {
        String::new()
    };

    Some(RawRecord {
        id: if id.is_empty() {
            String::new()
        } else {
            format!("europepmc-{}", id)
        },
        title,
        authors: authors.join("; "),
        journal: str_at(&journal["title"]),
        journal_id,
        publication_date,
        doi,
        url,
        r#abstract: str_at(&item["abstractText"]),
        source: "europe_pmc".into(),
    })
}
