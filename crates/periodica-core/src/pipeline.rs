//! Normalization and deduplication pipeline.
//!
//! Raw records from every source go through, in order:
//!
//! 1. **normalize** – map onto [`NormalizedRecord`] (malformed records dropped)
//! 2. **validate** – drop records without title, date, or DOI/URL
//! 3. **exact dedup** – collapse records sharing a DOI
//! 4. **fuzzy dedup** – merge DOI-less records into an accepted record whose
//!    title similarity is strictly above the threshold
//! 5. **filter** – date window and optional journal filter
//! 6. **sort** – newest first
//!
//! Duplicates are collapsed with [`merge_duplicates`]: the more complete record
//! wins and inherits any field it is missing from the other.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::matching::{DEFAULT_FUZZY_THRESHOLD, titles_match};
use crate::query::{QUERY_DATE_FORMAT, SearchQuery};
use crate::record::{NormalizedRecord, RawRecord};

/// Sort key used for records whose date cannot be parsed.
pub const UNDATED_SORT_KEY: &str = "1900-01-01";

/// Tunables for [`process`].
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub fuzzy_threshold: f64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

/// Run the full pipeline over merged adapter output.
pub fn process(
    raw: Vec<RawRecord>,
    query: &SearchQuery,
    options: &PipelineOptions,
) -> Vec<NormalizedRecord> {
    let total = raw.len();
    let normalized = normalize_all(raw);
    let valid: Vec<NormalizedRecord> = normalized.into_iter().filter(|r| r.is_valid()).collect();
    let valid_count = valid.len();
    let unique = deduplicate(valid, options.fuzzy_threshold);
    let unique_count = unique.len();
    let mut records = filter(unique, query);
    sort_by_date(&mut records);

    tracing::debug!(
        raw = total,
        valid = valid_count,
        unique = unique_count,
        kept = records.len(),
        "pipeline finished"
    );
    records
}

/// Normalize each record, dropping (and logging) the ones that fail.
pub fn normalize_all(raw: Vec<RawRecord>) -> Vec<NormalizedRecord> {
    raw.into_iter()
        .filter_map(|r| match r.normalize() {
            Ok(rec) => Some(rec),
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed record");
                None
            }
        })
        .collect()
}

/// Collapse records describing the same work.
///
/// Records with a DOI are grouped by the case-folded DOI first; records without
/// one are then compared by title against everything accepted so far and merged
/// into the first match. Output order is first-seen order.
pub fn deduplicate(records: Vec<NormalizedRecord>, fuzzy_threshold: f64) -> Vec<NormalizedRecord> {
    let mut accepted: Vec<NormalizedRecord> = Vec::with_capacity(records.len());
    let mut by_doi: HashMap<String, usize> = HashMap::new();
    let mut without_doi: Vec<NormalizedRecord> = Vec::new();

    for record in records {
        if record.doi.is_empty() {
            without_doi.push(record);
            continue;
        }
        let key = record.doi.to_ascii_lowercase();
        match by_doi.get(&key) {
            Some(&idx) => {
                let existing = std::mem::take(&mut accepted[idx]);
                accepted[idx] = merge_duplicates(existing, record);
            }
            None => {
                by_doi.insert(key, accepted.len());
                accepted.push(record);
            }
        }
    }

    // Quadratic in the DOI-less subset; fine for a few hundred records.
    for record in without_doi {
        let target = accepted
            .iter()
            .position(|existing| titles_match(&record.title, &existing.title, fuzzy_threshold));
        match target {
            Some(idx) => {
                let existing = std::mem::take(&mut accepted[idx]);
                accepted[idx] = merge_duplicates(existing, record);
            }
            None => accepted.push(record),
        }
    }

    accepted
}

/// Pick the more complete of two duplicates and backfill it from the other.
///
/// Ties keep `existing`, the record processed first.
pub fn merge_duplicates(
    existing: NormalizedRecord,
    incoming: NormalizedRecord,
) -> NormalizedRecord {
    let (mut winner, loser) = if existing.completeness() >= incoming.completeness() {
        (existing, incoming)
    } else {
        (incoming, existing)
    };
    tracing::trace!(kept = %winner.id, merged = %loser.id, "merging duplicate records");
    winner.backfill_from(&loser);
    winner
}

/// Keep records inside the query's date window and, when a journal filter is
/// set, from one of the requested journals.
///
/// Unparsable dates count as outside the window.
pub fn filter(records: Vec<NormalizedRecord>, query: &SearchQuery) -> Vec<NormalizedRecord> {
    let journals: Vec<String> = query.journals.iter().map(|j| j.to_lowercase()).collect();
    records
        .into_iter()
        .filter(|r| match parse_date(&r.publication_date) {
            Some(date) => date >= query.start_date && date <= query.end_date,
            None => false,
        })
        .filter(|r| journals.is_empty() || journal_matches(r, &journals))
        .collect()
}

/// `journal_id` may hold several `;`-separated ISSNs (print and electronic).
fn journal_matches(record: &NormalizedRecord, journals: &[String]) -> bool {
    let ids: Vec<String> = record
        .journal_id
        .split(';')
        .map(|id| id.trim().to_lowercase())
        .filter(|id| !id.is_empty())
        .collect();
    let name = record.journal.to_lowercase();
    journals
        .iter()
        .any(|j| ids.contains(j) || (!name.is_empty() && *j == name))
}

/// Sort newest first by ISO date; unparsable dates sort as [`UNDATED_SORT_KEY`].
///
/// The sort is stable, so records with equal dates keep their relative order.
pub fn sort_by_date(records: &mut [NormalizedRecord]) {
    records.sort_by(|a, b| sort_key(b).cmp(sort_key(a)));
}

fn sort_key(record: &NormalizedRecord) -> &str {
    if parse_date(&record.publication_date).is_some() {
        &record.publication_date
    } else {
        UNDATED_SORT_KEY
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, QUERY_DATE_FORMAT).ok()
}
