//! Raw adapter output and the canonical record every source is mapped into.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::normalize::{
    normalize_authors, normalize_date, normalize_doi, normalize_text,
};

/// Unmodified record as returned by a source adapter.
///
/// Field contents vary by source (author separators, date formats, DOI
/// prefixes); [`RawRecord::normalize`] maps them to a [`NormalizedRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    pub id: String,
    pub title: String,
    pub authors: String,
    pub journal: String,
    /// Source-side journal identifier (usually an ISSN), if the source has one.
    pub journal_id: String,
    pub publication_date: String,
    pub doi: String,
    pub url: String,
    pub r#abstract: String,
    pub source: String,
}

/// Canonical record shared by every source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizedRecord {
    pub id: String,
    pub title: String,
    /// `"Surname, Given; …"`, at most ten entries plus `"et al."`.
    pub authors: String,
    pub journal: String,
    pub journal_id: String,
    /// ISO `YYYY-MM-DD`, or empty.
    pub publication_date: String,
    /// Bare DOI without scheme prefix.
    pub doi: String,
    pub url: String,
    pub r#abstract: String,
    pub source: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("record {id:?} is not tagged with a source")]
    MissingSource { id: String },
}

impl RawRecord {
    /// Map this record onto the canonical schema.
    ///
    /// The URL is derived from the DOI when the source did not supply one, and
    /// an id is generated when missing (see [`record_id`]).
    pub fn normalize(self) -> Result<NormalizedRecord, RecordError> {
        let source = self.source.trim().to_string();
        if source.is_empty() {
            return Err(RecordError::MissingSource { id: self.id });
        }

        let doi = normalize_doi(&self.doi);
        let mut url = self.url.trim().to_string();
        if url.is_empty() && !doi.is_empty() {
            url = format!("https://doi.org/{}", doi);
        }

        let mut record = NormalizedRecord {
            id: self.id.trim().to_string(),
            title: normalize_text(&self.title),
            authors: normalize_authors(&self.authors),
            journal: normalize_text(&self.journal),
            journal_id: self.journal_id.trim().to_string(),
            publication_date: normalize_date(&self.publication_date),
            doi,
            url,
            r#abstract: normalize_text(&self.r#abstract),
            source,
        };
        if record.id.is_empty() {
            record.id = record_id(&record);
        }
        Ok(record)
    }
}

impl NormalizedRecord {
    /// A record is usable only with a title, a publication date, and a way to
    /// reach it (DOI or URL).
    pub fn is_valid(&self) -> bool {
        !self.title.is_empty()
            && !self.publication_date.is_empty()
            && (!self.doi.is_empty() || !self.url.is_empty())
    }

    /// Number of non-empty secondary fields (abstract, authors, journal, URL).
    pub fn completeness(&self) -> usize {
        [&self.r#abstract, &self.authors, &self.journal, &self.url]
            .iter()
            .filter(|f| !f.is_empty())
            .count()
    }

    /// Fill every empty field of `self` from `other`.
    pub fn backfill_from(&mut self, other: &NormalizedRecord) {
        fn fill(target: &mut String, donor: &str) {
            if target.is_empty() && !donor.is_empty() {
                *target = donor.to_string();
            }
        }
        fill(&mut self.title, &other.title);
        fill(&mut self.authors, &other.authors);
        fill(&mut self.journal, &other.journal);
        fill(&mut self.journal_id, &other.journal_id);
        fill(&mut self.publication_date, &other.publication_date);
        fill(&mut self.doi, &other.doi);
        fill(&mut self.url, &other.url);
        fill(&mut self.r#abstract, &other.r#abstract);
    }
}

/// Derive a stable id: `<source>-<doi>` when a DOI is known, otherwise a
/// content hash over title, authors and source.
pub fn record_id(record: &NormalizedRecord) -> String {
    if !record.doi.is_empty() {
        return format!("{}-{}", record.source, record.doi.replace('/', "-"));
    }
    let content = format!("{}|{}|{}", record.title, record.authors, record.source);
    let digest = format!("{:x}", Sha256::digest(content.as_bytes()));
    format!("hash-{}", &digest[..12])
}
