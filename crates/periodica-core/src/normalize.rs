//! Stateless field normalizers shared by the source adapters and the pipeline.
//!
//! Every function here is total: malformed input degrades to an empty string
//! (or is passed through) instead of failing.

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Maximum number of author entries kept before the "et al." marker.
pub const MAX_AUTHORS: usize = 10;

/// Marker appended to truncated author lists.
pub const ET_AL: &str = "et al.";

/// Date formats tried in order before falling back to year extraction.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%d %B %Y",
];

/// Scheme prefixes stripped from DOIs (matched case-insensitively).
const DOI_PREFIXES: &[&str] = &[
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "https://doi.org/",
    "http://doi.org/",
    "dx.doi.org/",
    "doi.org/",
    "doi:",
];

/// Boolean operators that must survive search-term cleanup.
const BOOLEAN_OPERATORS: &[&str] = &["AND", "OR", "NOT"];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static MARKUP_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static BOOLEAN_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(AND|OR|NOT)\b").unwrap());
static YEAR_MONTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})$").unwrap());
static YEAR_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}$").unwrap());
static EMBEDDED_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").unwrap());
static AUTHOR_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*(?:,?\s+and\s+|,?\s*&\s*|;)\s*").unwrap());

/// Common surname particles (case-insensitive).
static SURNAME_PREFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "van", "von", "de", "del", "della", "der", "di", "da", "dos", "du", "al", "el", "la",
        "le", "ben", "ibn",
    ]
    .into_iter()
    .collect()
});

/// Generational suffixes that are never a surname on their own.
static NAME_SUFFIXES: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["jr", "sr", "ii", "iii", "iv"].into_iter().collect());

/// Collapse whitespace and strip markup tags (JATS, HTML) from free text.
pub fn normalize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let stripped = MARKUP_TAG.replace_all(text, " ");
    // `&amp;` goes last so `&amp;lt;` decodes once, to `&lt;`.
    let unescaped = stripped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(&unescaped, " ").trim().to_string()
}

/// Strip a known scheme prefix from a DOI and trim it.
///
/// `"https://doi.org/10.1000/XYZ"` and `"doi:10.1000/XYZ"` both become
/// `"10.1000/XYZ"`. Case of the DOI body is preserved.
pub fn normalize_doi(doi: &str) -> String {
    let mut doi = doi.trim();
    for prefix in DOI_PREFIXES {
        if doi
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        {
            doi = &doi[prefix.len()..];
            break;
        }
    }
    doi.trim().to_string()
}

/// Normalize a date to ISO `YYYY-MM-DD`.
///
/// Tries [`DATE_FORMATS`], then RFC 3339 timestamps, then `YYYY-MM` and `YYYY`.
/// As a last resort a 4-digit year anywhere in the string yields `YEAR-01-01`.
/// Returns an empty string when nothing matches.
pub fn normalize_date(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.format("%Y-%m-%d").to_string();
        }
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(s) {
        return timestamp.date_naive().format("%Y-%m-%d").to_string();
    }

    if let Some(caps) = YEAR_MONTH.captures(s) {
        let year = caps[1].parse::<i32>().ok();
        let month = caps[2].parse::<u32>().ok();
        if let (Some(y), Some(m)) = (year, month)
            && let Some(date) = NaiveDate::from_ymd_opt(y, m, 1)
        {
            return date.format("%Y-%m-%d").to_string();
        }
    }

    if YEAR_ONLY.is_match(s) {
        return format!("{}-01-01", s);
    }

    if let Some(year) = EMBEDDED_YEAR.find(s) {
        return format!("{}-01-01", year.as_str());
    }

    tracing::debug!(date = s, "unrecognised date format");
    String::new()
}

/// Normalize an author list into `"Surname, Given; Surname, Given"`.
///
/// Accepts `and`, `&` and `;` as separators, keeps at most [`MAX_AUTHORS`]
/// entries and appends [`ET_AL`] when the list was truncated or already
/// carried the marker.
pub fn normalize_authors(authors: &str) -> String {
    let collapsed = normalize_text(authors);
    if collapsed.is_empty() {
        return String::new();
    }

    let mut entries: Vec<String> = Vec::new();
    let mut has_marker = false;
    for part in AUTHOR_SEPARATOR.split(&collapsed) {
        let part = part.trim().trim_end_matches(',').trim();
        if part.is_empty() {
            continue;
        }
        if is_et_al(part) {
            has_marker = true;
            continue;
        }
        entries.push(format_author(part));
    }

    if entries.len() > MAX_AUTHORS {
        entries.truncate(MAX_AUTHORS);
        has_marker = true;
    }
    if has_marker && !entries.is_empty() {
        entries.push(ET_AL.to_string());
    }
    entries.join("; ")
}

/// Normalize the author constraint of a query to `"Surname, Given"`.
pub fn normalize_query_author(author: &str) -> String {
    let author = WHITESPACE.replace_all(author, " ").trim().to_string();
    if author.is_empty() {
        return author;
    }
    format_author(&author)
}

/// Clean search terms while keeping literal `AND`/`OR`/`NOT` operators intact.
///
/// Operators are swapped for placeholders before the text cleanup runs and
/// restored afterwards.
pub fn normalize_search_terms(terms: &str) -> String {
    if terms.trim().is_empty() {
        return String::new();
    }
    let protected = BOOLEAN_TOKEN.replace_all(terms, "__${1}__");
    let mut cleaned = normalize_text(&protected);
    for op in BOOLEAN_OPERATORS {
        cleaned = cleaned.replace(&format!("__{}__", op), op);
    }
    cleaned
}

fn is_et_al(entry: &str) -> bool {
    let lower = entry.to_lowercase();
    let lower = lower.trim_end_matches('.');
    lower == "et al" || lower == "et. al"
}

/// Reformat a single name toward `"Surname, Given"`.
fn format_author(name: &str) -> String {
    if let Some((surname, given)) = name.split_once(',') {
        let surname = surname.trim();
        let given = given.trim();
        return if given.is_empty() {
            surname.to_string()
        } else {
            format!("{}, {}", surname, given)
        };
    }

    let parts: Vec<&str> = name.split_whitespace().collect();
    if parts.len() < 2 {
        return name.trim().to_string();
    }

    // "Abrahao S" / "Smith JA": trailing initials block
    let last = parts[parts.len() - 1];
    let initials = last.trim_end_matches('.');
    if !initials.is_empty()
        && initials.len() <= 2
        && initials.chars().all(|c| c.is_uppercase() || c == '.')
    {
        return format!("{}, {}", parts[..parts.len() - 1].join(" "), last);
    }

    let mut core = parts.clone();
    let mut suffix = None;
    if core.len() > 2 && is_suffix(core[core.len() - 1]) {
        suffix = core.pop();
    }

    let surname_len = surname_length(&core);
    let (given, surname) = core.split_at(core.len() - surname_len);
    let mut given = given.join(" ");
    if let Some(s) = suffix {
        given.push(' ');
        given.push_str(s);
    }
    format!("{}, {}", surname.join(" "), given.trim())
}

fn is_suffix(part: &str) -> bool {
    NAME_SUFFIXES.contains(part.to_lowercase().trim_end_matches('.'))
}

fn is_particle(part: &str) -> bool {
    SURNAME_PREFIXES.contains(part.to_lowercase().trim_end_matches('.'))
}

/// Number of trailing parts that form the surname ("De La Cruz", "Van Bavel").
/// At least one leading part is always left as the given name.
fn surname_length(parts: &[&str]) -> usize {
    let n = parts.len();
    if n >= 4 && is_particle(parts[n - 3]) {
        return 3;
    }
    if n >= 3 && is_particle(parts[n - 2]) {
        return 2;
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_collapses_whitespace_and_strips_tags() {
        assert_eq!(
            normalize_text("  <jats:p>Deep\n\tlearning</jats:p>  <b>works</b> "),
            "Deep learning works"
        );
        assert_eq!(normalize_text("Fish &amp; Chips"), "Fish & Chips");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn text_entities_decode_once() {
        assert_eq!(normalize_text("x &amp;lt; y"), "x &lt; y");
        assert_eq!(normalize_text("a &lt; b &amp;&amp; c"), "a < b && c");
    }

    #[test]
    fn doi_prefixes_are_stripped() {
        assert_eq!(normalize_doi("https://doi.org/10.1/X"), "10.1/X");
        assert_eq!(normalize_doi("http://dx.doi.org/10.1/X"), "10.1/X");
        assert_eq!(normalize_doi("doi:10.1/X"), "10.1/X");
        assert_eq!(normalize_doi("DOI: 10.1/X "), "10.1/X");
        assert_eq!(normalize_doi("  10.1/X"), "10.1/X");
        assert_eq!(normalize_doi(""), "");
    }

    #[test]
    fn date_known_formats() {
        assert_eq!(normalize_date("2023-01-15"), "2023-01-15");
        assert_eq!(normalize_date("2023/01/15"), "2023-01-15");
        assert_eq!(normalize_date("15/01/2023"), "2023-01-15");
        assert_eq!(normalize_date("01/15/2023"), "2023-01-15");
        assert_eq!(normalize_date("15-01-2023"), "2023-01-15");
        assert_eq!(normalize_date("15.01.2023"), "2023-01-15");
        assert_eq!(normalize_date("January 15, 2023"), "2023-01-15");
        assert_eq!(normalize_date("15 January 2023"), "2023-01-15");
    }

    #[test]
    fn date_partial_and_timestamp_forms() {
        assert_eq!(normalize_date("2023-03"), "2023-03-01");
        assert_eq!(normalize_date("2023"), "2023-01-01");
        assert_eq!(normalize_date("2023-05-02T10:00:00Z"), "2023-05-02");
    }

    #[test]
    fn date_year_fallback_and_failure() {
        assert_eq!(normalize_date("Spring 2021"), "2021-01-01");
        assert_eq!(normalize_date("2022 Mar-Apr"), "2022-01-01");
        assert_eq!(normalize_date("unknown"), "");
        assert_eq!(normalize_date(""), "");
    }

    #[test]
    fn authors_separators_collapse() {
        assert_eq!(
            normalize_authors("John Smith and Alice Jones & Bob Brown; Carol White"),
            "Smith, John; Jones, Alice; Brown, Bob; White, Carol"
        );
        assert_eq!(
            normalize_authors("Smith, John; Jones, Alice"),
            "Smith, John; Jones, Alice"
        );
    }

    #[test]
    fn authors_surname_particles_and_initials() {
        assert_eq!(normalize_authors("Jay Van Bavel"), "Van Bavel, Jay");
        assert_eq!(normalize_authors("Maria De La Cruz"), "De La Cruz, Maria");
        assert_eq!(normalize_authors("Abrahao S"), "Abrahao, S");
        assert_eq!(normalize_authors("John Smith Jr."), "Smith, John Jr.");
        assert_eq!(normalize_authors("Plato"), "Plato");
    }

    #[test]
    fn authors_capped_with_marker() {
        let many: Vec<String> = (0..12).map(|i| format!("Author{} Name", i)).collect();
        let normalized = normalize_authors(&many.join("; "));
        let entries: Vec<&str> = normalized.split("; ").collect();
        assert_eq!(entries.len(), MAX_AUTHORS + 1);
        assert_eq!(entries.last(), Some(&ET_AL));
        assert_eq!(entries[0], "Name, Author0");
    }

    #[test]
    fn authors_existing_marker_kept_once() {
        assert_eq!(
            normalize_authors("Smith, John; et al."),
            "Smith, John; et al."
        );
    }

    #[test]
    fn query_author_reformatted() {
        assert_eq!(normalize_query_author("  Marie   Curie "), "Curie, Marie");
        assert_eq!(normalize_query_author("Curie, Marie"), "Curie, Marie");
        assert_eq!(normalize_query_author(""), "");
    }

    #[test]
    fn search_terms_keep_boolean_operators() {
        assert_eq!(
            normalize_search_terms("  cancer   AND <i>therapy</i> OR   NOT  mice "),
            "cancer AND therapy OR NOT mice"
        );
        // lower-case words are plain terms, not operators
        assert_eq!(normalize_search_terms("rock and roll"), "rock and roll");
        assert_eq!(normalize_search_terms("ANDROID"), "ANDROID");
    }
}
