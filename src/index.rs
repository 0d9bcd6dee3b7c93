//! In-memory knowledge index: records, snapshot building, and ranked search.
//!
//! A snapshot is built atomically from a full record list and never mutated
//! afterwards — the retriever swaps whole snapshots on refresh, so readers
//! either see the fully-old or the fully-new index, never a half-built one.
//! Search is a pure function of (query, filters) for a fixed snapshot and
//! weight vector.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::{ScoringWeights, SearchTuning};
use crate::matcher;
use crate::preprocess::{self, SynonymTable};

/// One knowledge-base question/answer entry. Immutable once indexed; updates
/// are whole-record replacements during a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Unique numeric ID, stable across reloads.
    pub id: u64,
    /// Question text.
    pub question: String,
    /// Answer text.
    pub answer: String,
    /// Free-form category (e.g., "licensing", "insurance").
    pub category: String,
    /// Optional region tag (e.g., a two-letter jurisdiction code).
    #[serde(default)]
    pub region: Option<String>,
    /// Free-form tags, whitespace-separated.
    #[serde(default)]
    pub tags: String,
}

/// How a search result was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Fuzzy,
    Keyword,
    Partial,
    None,
}

/// One ranked search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: u64,
    pub question: String,
    pub answer: String,
    pub category: String,
    pub region: Option<String>,
    /// Combined match score in `[0, 1]`.
    pub score: f64,
    /// Confidence derived from the score, in `[0, 1]`.
    pub confidence: f64,
    #[serde(rename = "matchType")]
    pub match_kind: MatchKind,
}

/// A record plus the derived matching data computed once at build time.
#[derive(Debug, Clone)]
struct IndexedRecord {
    record: Record,
    /// Keywords extracted from question+answer+tags.
    keywords: BTreeSet<String>,
    /// Lower-cased concatenation of question, answer, and tags, used for
    /// variant-substring checks.
    combined: String,
}

/// A fully-built, immutable generation of the index.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    records: Vec<IndexedRecord>,
    keyword_ids: BTreeMap<String, BTreeSet<u64>>,
    category_ids: BTreeMap<String, BTreeSet<u64>>,
    region_ids: BTreeMap<String, BTreeSet<u64>>,
    weights: ScoringWeights,
    synonyms: SynonymTable,
    tuning: SearchTuning,
}

impl IndexSnapshot {
    /// Build a snapshot from a full record list plus immutable copies of the
    /// trainer-owned weights and synonyms. Scans every record once; the
    /// result is complete before it is returned, so partially built state is
    /// never observable.
    pub fn build(
        records: Vec<Record>,
        weights: ScoringWeights,
        synonyms: SynonymTable,
        tuning: SearchTuning,
    ) -> Self {
        let mut indexed = Vec::with_capacity(records.len());
        let mut keyword_ids: BTreeMap<String, BTreeSet<u64>> = BTreeMap::new();
        let mut category_ids: BTreeMap<String, BTreeSet<u64>> = BTreeMap::new();
        let mut region_ids: BTreeMap<String, BTreeSet<u64>> = BTreeMap::new();

        for record in records {
            let combined = format!("{} {} {}", record.question, record.answer, record.tags)
                .to_lowercase();
            let keywords = preprocess::extract_keywords(&combined, &synonyms);

            for keyword in &keywords {
                keyword_ids.entry(keyword.clone()).or_default().insert(record.id);
            }
            category_ids
                .entry(record.category.to_lowercase())
                .or_default()
                .insert(record.id);
            if let Some(region) = &record.region {
                region_ids
                    .entry(region.to_lowercase())
                    .or_default()
                    .insert(record.id);
            }

            indexed.push(IndexedRecord {
                record,
                keywords,
                combined,
            });
        }

        Self {
            records: indexed,
            keyword_ids,
            category_ids,
            region_ids,
            weights,
            synonyms,
            tuning,
        }
    }

    /// Number of indexed records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The weight vector this snapshot scores with.
    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    /// Ranked search. Returns up to `limit` results, or up to `2 x limit`
    /// when the best score is low enough that the caller may want to run its
    /// own disambiguation. Never fails: empty or unmatched queries yield an
    /// empty list.
    pub fn search(
        &self,
        query: &str,
        category: Option<&str>,
        region: Option<&str>,
        limit: usize,
    ) -> Vec<SearchResult> {
        let normalized = preprocess::normalize(query);
        if normalized.is_empty() || limit == 0 {
            return Vec::new();
        }

        let variants = preprocess::generate_variants(query, &self.synonyms);
        let query_keywords = preprocess::extract_keywords(query, &self.synonyms);
        let named_regions: BTreeSet<&str> =
            preprocess::regions_named_in(&normalized).into_iter().collect();

        let candidate_ids = self.narrow_candidates(category, region);

        let mut scored = Vec::new();
        for entry in &self.records {
            if let Some(ids) = &candidate_ids {
                if !ids.contains(&entry.record.id) {
                    continue;
                }
            }
            if let Some(result) = self.score_candidate(
                entry,
                query,
                &normalized,
                &variants,
                &query_keywords,
                &named_regions,
            ) {
                scored.push(result);
            }
        }

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.id.cmp(&b.id))
        });

        let top_score = scored.first().map(|r| r.score).unwrap_or(0.0);
        let cap = if top_score < self.tuning.low_confidence_cutoff {
            limit * 2
        } else {
            limit
        };
        scored.truncate(cap);
        scored
    }

    /// Candidate IDs after applying category/region filters. `None` means
    /// every record is a candidate. An unknown filter value narrows to the
    /// empty set — that is an empty result, not an error.
    fn narrow_candidates(
        &self,
        category: Option<&str>,
        region: Option<&str>,
    ) -> Option<BTreeSet<u64>> {
        let by_category = category.map(|c| {
            self.category_ids
                .get(&c.to_lowercase())
                .cloned()
                .unwrap_or_default()
        });
        let by_region = region.map(|r| {
            self.region_ids
                .get(&r.to_lowercase())
                .cloned()
                .unwrap_or_default()
        });

        match (by_category, by_region) {
            (Some(cats), Some(regs)) => Some(cats.intersection(&regs).copied().collect()),
            (Some(cats), None) => Some(cats),
            (None, Some(regs)) => Some(regs),
            (None, None) => None,
        }
    }

    fn score_candidate(
        &self,
        entry: &IndexedRecord,
        raw_query: &str,
        normalized: &str,
        variants: &[String],
        query_keywords: &BTreeSet<String>,
        named_regions: &BTreeSet<&str>,
    ) -> Option<SearchResult> {
        let record = &entry.record;

        // Exact question match short-circuits all scoring.
        if raw_query.trim().eq_ignore_ascii_case(record.question.trim()) {
            return Some(self.make_result(record, 1.0, MatchKind::Exact));
        }

        let threshold = self.tuning.match_threshold;
        let direct = matcher::score(normalized, &record.question, threshold)
            .max(matcher::score(normalized, &record.answer, threshold));

        let keyword = if query_keywords.is_empty() {
            0.0
        } else {
            let matched = query_keywords
                .iter()
                .filter(|kw| {
                    self.keyword_ids
                        .get(*kw)
                        .is_some_and(|ids| ids.contains(&record.id))
                        || entry.keywords.contains(*kw)
                })
                .count();
            matched as f64 / query_keywords.len() as f64
        };

        let variant_bonus = variants
            .iter()
            .any(|v| !v.is_empty() && entry.combined.contains(&v.to_lowercase()));
        let variant = if variant_bonus { 1.0 } else { 0.0 };

        let weights = &self.weights;
        let mut score =
            weights.direct_text * direct + weights.keyword * keyword + weights.variant * variant;

        // Queries that name a jurisdiction strongly prefer records tagged
        // with it.
        if let Some(region) = &record.region {
            if named_regions.contains(region.to_lowercase().as_str()) {
                score *= self.tuning.region_boost;
            }
        }
        let score = score.min(1.0);

        if score <= self.tuning.prune_threshold {
            return None;
        }

        let kind = if direct > 0.7 {
            MatchKind::Fuzzy
        } else if keyword > 0.5 {
            MatchKind::Keyword
        } else {
            MatchKind::Partial
        };

        Some(self.make_result(record, score, kind))
    }

    fn make_result(&self, record: &Record, score: f64, kind: MatchKind) -> SearchResult {
        SearchResult {
            id: record.id,
            question: record.question.clone(),
            answer: record.answer.clone(),
            category: record.category.clone(),
            region: record.region.clone(),
            score,
            confidence: (score * 1.2).min(1.0),
            match_kind: kind,
        }
    }
}
