//! Fuzzy string matching primitives.
//!
//! Pure functions with no shared state — safe to call concurrently without
//! locking. `score` implements the tiered similarity used by the index:
//! exact equality, substring containment, token containment, then a weighted
//! blend of character-level similarity and token overlap.

use std::collections::HashSet;

/// Levenshtein edit distance (insert/delete/substitute cost 1 each).
pub fn edit_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Jaccard similarity of the lower-cased word sets of `a` and `b`.
/// Returns 0.0 if either side has no words.
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let set_a = word_set(a);
    let set_b = word_set(b);
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Character-level similarity in `[0, 1]`, 1.0 only for identical strings.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Tiered similarity score between a query and a candidate text.
///
/// Case-insensitive. Returns:
/// - 1.0 on exact equality
/// - 0.9 if the query is a substring of the candidate
/// - 0.8 if every query token appears as a token of the candidate
/// - otherwise `0.6 * similarity_ratio + 0.4 * token_overlap`
///
/// Values below `threshold` collapse to 0.0 so near-zero matches are pruned
/// before ranking. Empty query or candidate scores 0.0, never an error.
pub fn score(query: &str, candidate: &str, threshold: f64) -> f64 {
    let query = query.trim().to_lowercase();
    let candidate = candidate.trim().to_lowercase();
    if query.is_empty() || candidate.is_empty() {
        return 0.0;
    }

    if query == candidate {
        return 1.0;
    }
    if candidate.contains(&query) {
        return 0.9;
    }

    let query_words = word_set(&query);
    let candidate_words = word_set(&candidate);
    if !query_words.is_empty() && query_words.is_subset(&candidate_words) {
        return 0.8;
    }

    let blended = 0.6 * similarity_ratio(&query, &candidate) + 0.4 * token_overlap(&query, &candidate);
    if blended < threshold {
        0.0
    } else {
        blended
    }
}

/// Lower-cased word set of a text (alphanumeric runs, hyphens kept inside
/// words).
fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric() && ch != '-')
        .filter(|word| !word.is_empty())
        .map(|word| word.trim_matches('-').to_string())
        .filter(|word| !word.is_empty())
        .collect()
}
