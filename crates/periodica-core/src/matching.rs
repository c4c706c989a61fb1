/// Default similarity above which two DOI-less titles are the same work.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.85;

/// Case-fold a title for comparison.
pub fn fold_title(title: &str) -> String {
    title.to_lowercase()
}

/// Normalized similarity of two titles in `[0, 1]`.
///
/// Uses the indel ratio `2 * LCS / (len_a + len_b)` over case-folded titles.
pub fn title_similarity(title_a: &str, title_b: &str) -> f64 {
    let a = fold_title(title_a);
    let b = fold_title(title_b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    rapidfuzz::fuzz::ratio(a.chars(), b.chars())
}

/// Whether two titles are close enough to merge (strictly above `threshold`).
pub fn titles_match(title_a: &str, title_b: &str, threshold: f64) -> bool {
    title_similarity(title_a, title_b) > threshold
}
