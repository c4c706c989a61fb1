//! Search requests, their validation, and the cache key derived from them.

use std::collections::BTreeSet;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::Config;

/// Date format accepted for query bounds.
pub const QUERY_DATE_FORMAT: &str = "%Y-%m-%d";

/// A search as submitted by a caller, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    /// Free-text terms; may contain literal `AND`/`OR`/`NOT` operators.
    pub terms: String,
    pub author: Option<String>,
    /// `YYYY-MM-DD`; defaults to today minus the configured window (one year).
    pub start_date: Option<String>,
    /// `YYYY-MM-DD`; defaults to today.
    pub end_date: Option<String>,
    pub journals: Vec<String>,
    pub limit: Option<usize>,
    /// Source names; empty means every registered source.
    pub sources: Vec<String>,
}

/// A validated search with every default resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub terms: String,
    pub author: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub journals: BTreeSet<String>,
    pub limit: usize,
    pub sources: BTreeSet<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("search terms are required")]
    MissingTerms,
    #[error("invalid {field} date {value:?}, expected YYYY-MM-DD")]
    InvalidDate { field: &'static str, value: String },
    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
    #[error("limit {limit} is out of range (1..={max})")]
    LimitOutOfRange { limit: usize, max: usize },
    #[error("unknown source {0:?}")]
    UnknownSource(String),
}

impl SearchRequest {
    pub fn new(terms: impl Into<String>) -> Self {
        Self {
            terms: terms.into(),
            ..Default::default()
        }
    }

    /// Validate the request and resolve defaults.
    ///
    /// `known_sources` is the set of registered source names; `today` anchors
    /// the default date window.
    pub fn validate<'a>(
        &self,
        config: &Config,
        known_sources: impl IntoIterator<Item = &'a str>,
        today: NaiveDate,
    ) -> Result<SearchQuery, ValidationError> {
        let terms = self.terms.trim();
        if terms.is_empty() {
            return Err(ValidationError::MissingTerms);
        }

        let end_date = parse_bound("end", self.end_date.as_deref())?.unwrap_or(today);
        let start_date = match parse_bound("start", self.start_date.as_deref())? {
            Some(d) => d,
            None => today
                .checked_sub_months(Months::new(config.default_window_months))
                .unwrap_or(NaiveDate::MIN),
        };
        if start_date > end_date {
            return Err(ValidationError::InvertedRange {
                start: start_date,
                end: end_date,
            });
        }

        let limit = self.limit.unwrap_or(config.default_limit);
        if limit == 0 || limit > config.max_limit {
            return Err(ValidationError::LimitOutOfRange {
                limit,
                max: config.max_limit,
            });
        }

        let known: BTreeSet<&str> = known_sources.into_iter().collect();
        let mut sources = BTreeSet::new();
        for name in &self.sources {
            let name = name.trim().to_lowercase();
            if name.is_empty() {
                continue;
            }
            if !known.contains(name.as_str()) {
                return Err(ValidationError::UnknownSource(name));
            }
            sources.insert(name);
        }
        if sources.is_empty() {
            sources = known.iter().map(|s| s.to_string()).collect();
        }

        let journals = self
            .journals
            .iter()
            .map(|j| j.trim().to_string())
            .filter(|j| !j.is_empty())
            .collect();

        Ok(SearchQuery {
            terms: terms.to_string(),
            author: self
                .author
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            start_date,
            end_date,
            journals,
            limit,
            sources,
        })
    }
}

fn parse_bound(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<NaiveDate>, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => NaiveDate::parse_from_str(v, QUERY_DATE_FORMAT)
            .map(Some)
            .map_err(|_| ValidationError::InvalidDate {
                field,
                value: v.to_string(),
            }),
    }
}

impl SearchQuery {
    /// Deterministic cache key: hex SHA-256 over the lower-cased terms and
    /// author, both date bounds, and the sorted journal and source sets.
    ///
    /// The result limit is not part of the key.
    pub fn cache_key(&self) -> String {
        let journals: Vec<&str> = self.journals.iter().map(String::as_str).collect();
        let sources: Vec<&str> = self.sources.iter().map(String::as_str).collect();
        let material = format!(
            "{}|{}|{}|{}|{}|{}",
            self.terms.trim().to_lowercase(),
            self.author.trim().to_lowercase(),
            self.start_date.format(QUERY_DATE_FORMAT),
            self.end_date.format(QUERY_DATE_FORMAT),
            journals.join(","),
            sources.join(","),
        );
        format!("{:x}", Sha256::digest(material.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCES: [&str; 3] = ["crossref", "openalex", "pubmed"];

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn validate(req: &SearchRequest) -> Result<SearchQuery, ValidationError> {
        req.validate(&Config::default(), SOURCES, today())
    }

    #[test]
    fn defaults_are_resolved() {
        let q = validate(&SearchRequest::new("cancer")).unwrap();
        assert_eq!(q.end_date, today());
        assert_eq!(q.start_date, NaiveDate::from_ymd_opt(2023, 6, 15).unwrap());
        assert_eq!(q.limit, 30);
        assert_eq!(q.sources.len(), 3);
        assert!(q.journals.is_empty());
        assert_eq!(q.author, "");
    }

    #[test]
    fn missing_terms_rejected() {
        assert_eq!(
            validate(&SearchRequest::new("   ")),
            Err(ValidationError::MissingTerms)
        );
    }

    #[test]
    fn bad_dates_rejected() {
        let req = SearchRequest {
            start_date: Some("2023/01/01".into()),
            ..SearchRequest::new("x")
        };
        assert!(matches!(
            validate(&req),
            Err(ValidationError::InvalidDate { field: "start", .. })
        ));

        let req = SearchRequest {
            start_date: Some("2023-12-31".into()),
            end_date: Some("2023-01-01".into()),
            ..SearchRequest::new("x")
        };
        assert!(matches!(
            validate(&req),
            Err(ValidationError::InvertedRange { .. })
        ));
    }

    #[test]
    fn limit_bounds() {
        for limit in [0, 501] {
            let req = SearchRequest {
                limit: Some(limit),
                ..SearchRequest::new("x")
            };
            assert!(matches!(
                validate(&req),
                Err(ValidationError::LimitOutOfRange { .. })
            ));
        }
        let req = SearchRequest {
            limit: Some(500),
            ..SearchRequest::new("x")
        };
        assert_eq!(validate(&req).unwrap().limit, 500);
    }

    #[test]
    fn unknown_source_rejected() {
        let req = SearchRequest {
            sources: vec!["CrossRef".into(), "scopus".into()],
            ..SearchRequest::new("x")
        };
        assert_eq!(
            validate(&req),
            Err(ValidationError::UnknownSource("scopus".into()))
        );
    }

    #[test]
    fn cache_key_ignores_list_order_and_case() {
        let a = SearchRequest {
            terms: "Cancer AND Therapy ".into(),
            author: Some("Curie".into()),
            start_date: Some("2023-01-01".into()),
            end_date: Some("2023-12-31".into()),
            journals: vec!["1234-5678".into(), "0028-0836".into()],
            sources: vec!["pubmed".into(), "crossref".into()],
            limit: Some(10),
        };
        let b = SearchRequest {
            terms: "cancer and therapy".into(),
            author: Some("  curie".into()),
            journals: vec!["0028-0836".into(), "1234-5678".into()],
            sources: vec!["crossref".into(), "pubmed".into()],
            limit: Some(50),
            ..a.clone()
        };
        let ka = validate(&a).unwrap().cache_key();
        let kb = validate(&b).unwrap().cache_key();
        assert_eq!(ka, kb);
        assert_eq!(ka.len(), 64);
    }

    #[test]
    fn cache_key_changes_with_bounds() {
        let a = SearchRequest {
            start_date: Some("2023-01-01".into()),
            end_date: Some("2023-12-31".into()),
            ..SearchRequest::new("x")
        };
        let b = SearchRequest {
            end_date: Some("2023-11-30".into()),
            ..a.clone()
        };
        assert_ne!(
            validate(&a).unwrap().cache_key(),
            validate(&b).unwrap().cache_key()
        );
    }
}
