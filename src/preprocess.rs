//! Query preprocessing: normalization, keyword extraction, and variant
//! generation.
//!
//! Voice transcripts arrive noisy — abbreviated, oddly punctuated, wrapped in
//! question boilerplate. The preprocessor flattens all of that into forms the
//! matcher can score. It never fails: absent patterns simply produce fewer
//! variants, and empty input yields an empty keyword set plus a single
//! empty-string variant.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Domain abbreviations expanded during normalization (whole-word).
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("lic", "license"),
    ("lics", "licenses"),
    ("req", "requirement"),
    ("reqs", "requirements"),
    ("cert", "certificate"),
    ("certs", "certificates"),
    ("app", "application"),
    ("apps", "applications"),
    ("ins", "insurance"),
    ("exp", "experience"),
    ("biz", "business"),
    ("info", "information"),
    ("gc", "general contractor"),
    ("sub", "subcontractor"),
    ("subs", "subcontractors"),
    ("dept", "department"),
    ("regs", "regulations"),
    ("qual", "qualification"),
    ("quals", "qualifications"),
];

/// Region codes and their full names, used for abbreviation expansion and
/// for detecting region-naming queries.
const REGIONS: &[(&str, &str)] = &[
    ("al", "alabama"),
    ("ak", "alaska"),
    ("az", "arizona"),
    ("ar", "arkansas"),
    ("ca", "california"),
    ("co", "colorado"),
    ("ct", "connecticut"),
    ("de", "delaware"),
    ("fl", "florida"),
    ("ga", "georgia"),
    ("hi", "hawaii"),
    ("id", "idaho"),
    ("il", "illinois"),
    ("in", "indiana"),
    ("ia", "iowa"),
    ("ks", "kansas"),
    ("ky", "kentucky"),
    ("la", "louisiana"),
    ("me", "maine"),
    ("md", "maryland"),
    ("ma", "massachusetts"),
    ("mi", "michigan"),
    ("mn", "minnesota"),
    ("ms", "mississippi"),
    ("mo", "missouri"),
    ("mt", "montana"),
    ("ne", "nebraska"),
    ("nv", "nevada"),
    ("nh", "new hampshire"),
    ("nj", "new jersey"),
    ("nm", "new mexico"),
    ("ny", "new york"),
    ("nc", "north carolina"),
    ("nd", "north dakota"),
    ("oh", "ohio"),
    ("ok", "oklahoma"),
    ("or", "oregon"),
    ("pa", "pennsylvania"),
    ("ri", "rhode island"),
    ("sc", "south carolina"),
    ("sd", "south dakota"),
    ("tn", "tennessee"),
    ("tx", "texas"),
    ("ut", "utah"),
    ("vt", "vermont"),
    ("va", "virginia"),
    ("wa", "washington"),
    ("wv", "west virginia"),
    ("wi", "wisconsin"),
    ("wy", "wyoming"),
];

/// Region codes that collide with common English words. These only expand
/// when the raw token was written in uppercase ("IN license" vs "license in
/// georgia"), so everyday prose is left alone.
const AMBIGUOUS_REGION_CODES: &[&str] = &[
    "in", "or", "me", "hi", "ok", "oh", "de", "id", "la", "pa", "co", "al", "mt", "ms", "md",
];

/// Stop words removed during keyword extraction.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "what", "which", "who", "how",
    "when", "where", "why", "do", "does", "did", "can", "could", "will", "would", "should", "i",
    "my", "me", "you", "your", "we", "our", "it", "its", "this", "that", "these", "those", "and",
    "or", "but", "for", "to", "of", "in", "on", "at", "with", "about", "need", "get", "tell",
    "there", "have", "has",
];

/// Question-prefix patterns stripped to produce the simplified variant.
/// Ordered; first match wins.
const QUESTION_PREFIXES: &[&str] = &[
    "can you tell me about ",
    "can you tell me ",
    "tell me about ",
    "what do i need to ",
    "what are the ",
    "what are ",
    "what is the ",
    "what is ",
    "how do i ",
    "how can i ",
    "how much ",
    "how long ",
    "do i need ",
    "where do i ",
    "where can i ",
];

/// Word -> related-words table, grown only by the trainer and consulted by
/// the preprocessor when generating variants and augmenting keywords.
///
/// Backed by ordered maps so every consumer iterates deterministically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynonymTable {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl SynonymTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `synonym` as related to `word` (and nothing else — relations
    /// are directional, mined from observed query/answer pairs). Self-pairs
    /// are ignored. Returns `true` if the entry was newly added.
    pub fn add(&mut self, word: &str, synonym: &str) -> bool {
        let word = word.trim().to_lowercase();
        let synonym = synonym.trim().to_lowercase();
        if word.is_empty() || synonym.is_empty() || word == synonym {
            return false;
        }
        self.entries.entry(word).or_default().insert(synonym)
    }

    /// Related words for `word`, if any.
    pub fn get(&self, word: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(word)
    }

    /// Number of head words with at least one synonym.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over (word, synonyms) pairs in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.entries.iter()
    }
}

/// Lower-case, collapse whitespace, strip punctuation (hyphens inside words
/// survive), and expand domain abbreviations and region codes whole-word.
///
/// Idempotent: expansions are never themselves abbreviation keys.
pub fn normalize(text: &str) -> String {
    let mut words = Vec::new();
    for raw in text.split_whitespace() {
        let was_uppercase = raw.len() > 1 && raw.chars().all(|c| !c.is_lowercase());
        let cleaned = clean_token(raw);
        if cleaned.is_empty() {
            continue;
        }

        if let Some(expansion) = expand_abbreviation(&cleaned, was_uppercase) {
            words.push(expansion.to_string());
        } else {
            words.push(cleaned);
        }
    }
    words.join(" ")
}

/// Normalized keywords of a text: stop words removed, short words dropped,
/// each surviving word augmented with up to two synonyms.
pub fn extract_keywords(text: &str, synonyms: &SynonymTable) -> BTreeSet<String> {
    let mut keywords = BTreeSet::new();
    for word in normalize(text).split_whitespace() {
        if word.len() <= 2 || STOP_WORDS.contains(&word) {
            continue;
        }
        keywords.insert(word.to_string());
    }

    let mut augmented = keywords.clone();
    for word in &keywords {
        if let Some(related) = synonyms.get(word) {
            for syn in related.iter().take(2) {
                augmented.insert(syn.clone());
            }
        }
    }
    augmented
}

/// Alternate phrasings of a query: the raw text, its normalized form, a
/// question-prefix-stripped form, a keyword-only form, and up to one
/// synonym-substituted form per recognized word. Deduplicated, in
/// generation-priority order.
pub fn generate_variants(text: &str, synonyms: &SynonymTable) -> Vec<String> {
    let raw = text.trim().to_string();
    if raw.is_empty() {
        return vec![String::new()];
    }

    let normalized = normalize(text);
    let mut variants = vec![raw, normalized.clone()];

    for prefix in QUESTION_PREFIXES {
        if let Some(stripped) = normalized.strip_prefix(prefix) {
            if !stripped.is_empty() {
                variants.push(stripped.to_string());
            }
            break;
        }
    }

    let keywords = extract_keywords(text, synonyms);
    if !keywords.is_empty() {
        variants.push(keywords.into_iter().collect::<Vec<_>>().join(" "));
    }

    for word in normalized.split_whitespace() {
        if let Some(related) = synonyms.get(word) {
            if let Some(syn) = related.iter().next() {
                variants.push(substitute_word(&normalized, word, syn));
            }
        }
    }

    let mut seen = BTreeSet::new();
    variants.retain(|v| seen.insert(v.clone()));
    variants
}

/// Region codes whose code (whole word) or full name appears in the text.
/// Expects normalized input; matching is by simple substring/word lookup.
/// Longer names are matched first and their span consumed, so "west
/// virginia" does not also report virginia.
pub fn regions_named_in(text: &str) -> Vec<&'static str> {
    let words: BTreeSet<&str> = text.split_whitespace().collect();
    let mut remaining = text.to_string();

    let mut by_length: Vec<(&'static str, &'static str)> = REGIONS.to_vec();
    by_length.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));

    let mut named = Vec::new();
    for (code, name) in by_length {
        let name_pos = remaining.find(name);
        if words.contains(code) || name_pos.is_some() {
            if let Some(pos) = name_pos {
                remaining.replace_range(pos..pos + name.len(), " ");
            }
            named.push(code);
        }
    }
    named.sort_unstable();
    named
}

/// Full region name for a code, if known. Case-insensitive.
pub fn region_name(code: &str) -> Option<&'static str> {
    let code = code.to_lowercase();
    REGIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

fn clean_token(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect();
    kept.trim_matches('-').to_lowercase()
}

fn expand_abbreviation(word: &str, was_uppercase: bool) -> Option<&'static str> {
    if let Some(&(_, expansion)) = ABBREVIATIONS.iter().find(|(abbr, _)| *abbr == word) {
        return Some(expansion);
    }
    if let Some(&(code, name)) = REGIONS.iter().find(|(code, _)| *code == word) {
        if was_uppercase || !AMBIGUOUS_REGION_CODES.contains(&code) {
            return Some(name);
        }
    }
    None
}

fn substitute_word(text: &str, word: &str, replacement: &str) -> String {
    text.split_whitespace()
        .map(|w| if w == word { replacement } else { w })
        .collect::<Vec<_>>()
        .join(" ")
}
