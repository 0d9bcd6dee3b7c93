//! Feedback-driven trainer.
//!
//! Consumes (query, returned result, judgment) feedback events, nudges the
//! scoring weights, and grows the synonym table from observed matches. The
//! trainer exclusively owns this mutable state; live search only ever sees
//! an immutable copy, pushed to the retriever at batch boundaries together
//! with a `refresh_index` call. Training never mutates the index directly.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ScoringWeights, TrainerConfig};
use crate::error::Result;
use crate::index::{MatchKind, SearchResult};
use crate::preprocess::{self, SynonymTable};
use crate::retriever::Retriever;

/// Human judgment of a returned result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLabel {
    Correct,
    Incorrect,
    Partial,
}

/// One recorded feedback event. Append-only; accumulated for the process
/// lifetime or until exported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    pub query: String,
    /// User-supplied expected answer, when the returned one was wrong.
    pub expected_answer: Option<String>,
    /// The answer the retriever actually returned.
    pub actual_answer: String,
    pub label: FeedbackLabel,
    /// Score the result carried when it was returned.
    pub score: f64,
    pub timestamp: DateTime<Utc>,
    pub category: String,
    pub match_kind: MatchKind,
    pub confidence: f64,
}

/// Outcome of a `record_feedback` call.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackOutcome {
    pub accepted: bool,
    #[serde(rename = "rollingAccuracy")]
    pub rolling_accuracy: f64,
}

/// Aggregate training statistics.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingStats {
    #[serde(rename = "totalExamples")]
    pub total_examples: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub partial: usize,
    #[serde(rename = "rollingAccuracy")]
    pub rolling_accuracy: f64,
    #[serde(rename = "weightVector")]
    pub weights: ScoringWeights,
}

/// A diagnostic improvement suggestion. Informational only.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub description: String,
    pub occurrences: usize,
}

/// Feedback trainer owning the mutable weight vector and synonym table.
pub struct Trainer {
    retriever: Arc<Retriever>,
    config: TrainerConfig,
    examples: Vec<TrainingExample>,
    weights: ScoringWeights,
    synonyms: SynonymTable,
    /// How often each mined "word -> synonym" entry was (re)observed.
    synonym_growth: HashMap<String, usize>,
    /// Successful query-pattern counts, kept for diagnostics.
    success_patterns: HashMap<String, usize>,
}

impl Trainer {
    /// Create a trainer pushing updates into `retriever`, starting from the
    /// retriever's configured initial weights.
    pub fn new(retriever: Arc<Retriever>, config: TrainerConfig, weights: ScoringWeights) -> Self {
        Self {
            retriever,
            config,
            examples: Vec::new(),
            weights,
            synonyms: SynonymTable::new(),
            synonym_growth: HashMap::new(),
            success_patterns: HashMap::new(),
        }
    }

    /// Record one feedback event and apply the matching adjustment rule.
    ///
    /// Malformed events (empty query or answer) are logged and dropped —
    /// they report `accepted: false` but never fail, so feedback problems
    /// cannot take search availability down. Every `batch_size` accepted
    /// events the updated weights and synonyms are pushed to the retriever
    /// and the index is refreshed; a failed refresh is retried at the next
    /// batch boundary.
    pub async fn record_feedback(
        &mut self,
        query: &str,
        result: &SearchResult,
        label: FeedbackLabel,
        expected_answer: Option<&str>,
    ) -> FeedbackOutcome {
        if query.trim().is_empty() || result.answer.trim().is_empty() {
            warn!("dropping malformed feedback event (empty query or answer)");
            return FeedbackOutcome {
                accepted: false,
                rolling_accuracy: self.rolling_accuracy(),
            };
        }

        self.examples.push(TrainingExample {
            query: query.to_string(),
            expected_answer: expected_answer.map(str::to_string),
            actual_answer: result.answer.clone(),
            label,
            score: result.score,
            timestamp: Utc::now(),
            category: result.category.clone(),
            match_kind: result.match_kind,
            confidence: result.confidence,
        });

        match label {
            FeedbackLabel::Correct => self.apply_correct(query, result, self.config.learning_rate),
            FeedbackLabel::Incorrect => self.apply_incorrect(query, result, expected_answer),
            FeedbackLabel::Partial => {
                if result.score > self.config.min_partial_score {
                    self.apply_correct(query, result, self.config.learning_rate / 2.0);
                }
            }
        }

        if self.examples.len() % self.config.batch_size.max(1) == 0 {
            self.push_to_retriever().await;
        }

        FeedbackOutcome {
            accepted: true,
            rolling_accuracy: self.rolling_accuracy(),
        }
    }

    /// Rolling accuracy over the most recent window of examples:
    /// `(correct + 0.5 * partial) / total`.
    pub fn rolling_accuracy(&self) -> f64 {
        let window_start = self.examples.len().saturating_sub(self.config.accuracy_window);
        let window = &self.examples[window_start..];
        if window.is_empty() {
            return 0.0;
        }

        let mut weighted = 0.0;
        for example in window {
            weighted += match example.label {
                FeedbackLabel::Correct => 1.0,
                FeedbackLabel::Partial => 0.5,
                FeedbackLabel::Incorrect => 0.0,
            };
        }
        weighted / window.len() as f64
    }

    /// Aggregate statistics over the full training log.
    pub fn stats(&self) -> TrainingStats {
        let count = |label: FeedbackLabel| {
            self.examples.iter().filter(|e| e.label == label).count()
        };
        TrainingStats {
            total_examples: self.examples.len(),
            correct: count(FeedbackLabel::Correct),
            incorrect: count(FeedbackLabel::Incorrect),
            partial: count(FeedbackLabel::Partial),
            rolling_accuracy: self.rolling_accuracy(),
            weights: self.weights,
        }
    }

    /// Diagnostic report: recurring failing query patterns and the most
    /// frequently grown synonym entries. Not a correctness-critical path.
    pub fn suggest_improvements(&self) -> Vec<Suggestion> {
        let mut failures: HashMap<String, usize> = HashMap::new();
        for example in &self.examples {
            if example.label == FeedbackLabel::Incorrect {
                *failures.entry(query_pattern(&example.query)).or_default() += 1;
            }
        }

        let mut suggestions: Vec<Suggestion> = failures
            .into_iter()
            .filter(|(_, count)| *count > self.config.min_pattern_failures)
            .map(|(pattern, count)| Suggestion {
                description: format!("queries {} fail often; review their coverage", pattern),
                occurrences: count,
            })
            .collect();

        let mut grown: Vec<(&String, &usize)> = self.synonym_growth.iter().collect();
        grown.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (entry, count) in grown.into_iter().take(5) {
            suggestions.push(Suggestion {
                description: format!("learned synonym {}", entry),
                occurrences: *count,
            });
        }

        suggestions.sort_by(|a, b| {
            b.occurrences
                .cmp(&a.occurrences)
                .then_with(|| a.description.cmp(&b.description))
        });
        suggestions
    }

    /// The trainer's current weight vector.
    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    /// The trainer's current synonym table.
    pub fn synonyms(&self) -> &SynonymTable {
        &self.synonyms
    }

    /// Serialize the full training log as JSON.
    pub fn export_examples(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.examples)?)
    }

    /// Append examples from a JSON export. Returns how many were imported.
    pub fn import_examples(&mut self, json: &str) -> Result<usize> {
        let imported: Vec<TrainingExample> = serde_json::from_str(json)?;
        let count = imported.len();
        self.examples.extend(imported);
        info!(count, "imported training examples");
        Ok(count)
    }

    /// Correct (or half-strength partial) adjustment: reinforce the winning
    /// match type's weight and, for fuzzy wins, mine synonym candidates from
    /// the query/answer word pairs that made the match work.
    fn apply_correct(&mut self, query: &str, result: &SearchResult, rate: f64) {
        *self
            .success_patterns
            .entry(query_pattern(query))
            .or_default() += 1;

        if result.match_kind == MatchKind::Fuzzy {
            self.mine_synonyms(query, &result.answer);
        }

        self.nudge_weight(result.match_kind, rate);
    }

    /// Incorrect adjustment: penalize the losing match type; when the score
    /// was very low and the user told us the right answer, mine synonyms
    /// from its keywords missing in the query.
    fn apply_incorrect(&mut self, query: &str, result: &SearchResult, expected: Option<&str>) {
        if result.score < self.config.low_score_threshold {
            if let Some(expected) = expected {
                self.mine_missing_keywords(query, expected);
            }
        }
        self.nudge_weight(result.match_kind, -self.config.learning_rate);
    }

    /// Pair query words with answer words that share a 3-character prefix or
    /// suffix. A cheap token-similarity heuristic, not morphology — but
    /// cheap is the point: this runs on every fuzzy-confirmed feedback.
    fn mine_synonyms(&mut self, query: &str, answer: &str) {
        let query_words = preprocess::extract_keywords(query, &SynonymTable::new());
        let answer_words = preprocess::extract_keywords(answer, &SynonymTable::new());

        for qw in &query_words {
            for aw in &answer_words {
                if shares_affix(qw, aw) {
                    self.record_synonym(qw, aw);
                }
            }
        }
    }

    /// For keywords the expected answer has but the query lacks, attach them
    /// as synonyms of the query words they resemble.
    fn mine_missing_keywords(&mut self, query: &str, expected: &str) {
        let query_words = preprocess::extract_keywords(query, &SynonymTable::new());
        let expected_words = preprocess::extract_keywords(expected, &SynonymTable::new());

        for missing in expected_words.difference(&query_words) {
            for qw in &query_words {
                if shares_affix(qw, missing) {
                    self.record_synonym(qw, missing);
                }
            }
        }
    }

    fn record_synonym(&mut self, word: &str, synonym: &str) {
        if self.synonyms.add(word, synonym) {
            debug!(word, synonym, "mined synonym candidate");
        }
        *self
            .synonym_growth
            .entry(format!("{} -> {}", word, synonym))
            .or_default() += 1;
    }

    /// Shift the weight component tied to a match type by `delta`, clamp to
    /// non-negative, and re-normalize so the vector sums to 1.0.
    fn nudge_weight(&mut self, kind: MatchKind, delta: f64) {
        let component = match kind {
            MatchKind::Exact | MatchKind::Fuzzy => &mut self.weights.direct_text,
            MatchKind::Keyword => &mut self.weights.keyword,
            MatchKind::Partial => &mut self.weights.variant,
            MatchKind::None => return,
        };
        *component = (*component + delta).max(0.0);
        self.weights.normalize();
    }

    /// Push current weights and synonyms to the retriever and refresh the
    /// index. This is the only path by which training reaches live search.
    async fn push_to_retriever(&mut self) {
        self.retriever
            .apply_training(self.weights, self.synonyms.clone());
        match self.retriever.refresh_index().await {
            Ok(()) => {
                info!(
                    examples = self.examples.len(),
                    synonyms = self.synonyms.len(),
                    "training batch applied"
                );
            }
            Err(e) => {
                // The previous snapshot stays authoritative; the next batch
                // boundary will push again.
                warn!("refresh after training batch failed: {}", e);
            }
        }
    }
}

/// Coarse grouping key for a query, used to cluster failures.
fn query_pattern(query: &str) -> String {
    let normalized = preprocess::normalize(query);
    if let Some(first) = normalized.split_whitespace().next() {
        if ["how", "what", "where", "when", "why", "can", "do", "does"].contains(&first) {
            return format!("starting with '{}'", first);
        }
    }

    let keywords = preprocess::extract_keywords(query, &SynonymTable::new());
    match keywords.iter().max_by_key(|k| k.len()) {
        Some(keyword) => format!("containing '{}'", keyword),
        None => "with no extractable keywords".to_string(),
    }
}

/// Whether two words share a 3-character prefix or suffix (and are not the
/// same word).
fn shares_affix(a: &str, b: &str) -> bool {
    if a == b {
        return false;
    }
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() < 3 || b.len() < 3 {
        return false;
    }
    a[..3] == b[..3] || a[a.len() - 3..] == b[b.len() - 3..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::{KbError, Result as KbResult};
    use crate::index::Record;
    use crate::source::{RecordSource, StaticSource};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_records() -> Vec<Record> {
        vec![Record {
            id: 1,
            question: "Georgia contractor license requirements".to_string(),
            answer: "Georgia requires licensure for contracting work".to_string(),
            category: "licensing".to_string(),
            region: Some("GA".to_string()),
            tags: String::new(),
        }]
    }

    fn fuzzy_result(score: f64) -> SearchResult {
        SearchResult {
            id: 1,
            question: "Georgia contractor license requirements".to_string(),
            answer: "Georgia requires licensure for contracting work".to_string(),
            category: "licensing".to_string(),
            region: Some("GA".to_string()),
            score,
            confidence: (score * 1.2).min(1.0),
            match_kind: MatchKind::Fuzzy,
        }
    }

    /// Record source that counts fetches, to observe refresh calls.
    struct CountingSource {
        inner: StaticSource,
        fetches: AtomicUsize,
    }

    impl CountingSource {
        fn new(records: Vec<Record>) -> Self {
            Self {
                inner: StaticSource::new(records),
                fetches: AtomicUsize::new(0),
            }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RecordSource for CountingSource {
        async fn fetch_records(&self) -> KbResult<Vec<Record>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch_records().await
        }
    }

    async fn trainer_with_config(config: TrainerConfig) -> (Trainer, Arc<CountingSource>) {
        let source = Arc::new(CountingSource::new(sample_records()));
        let retriever = Arc::new(Retriever::new(
            Arc::clone(&source) as Arc<dyn RecordSource>,
            Config::default(),
        ));
        retriever.initialize().await.unwrap();
        let trainer = Trainer::new(retriever, config, ScoringWeights::default());
        (trainer, source)
    }

    async fn trainer_with_counting_source() -> (Trainer, Arc<CountingSource>) {
        trainer_with_config(TrainerConfig::default()).await
    }

    #[tokio::test]
    async fn test_correct_fuzzy_feedback_shifts_direct_weight_up() {
        let (mut trainer, source) = trainer_with_counting_source().await;
        let before = trainer.weights().direct_text;

        for i in 0..10 {
            let outcome = trainer
                .record_feedback(
                    &format!("license question {}", i),
                    &fuzzy_result(0.8),
                    FeedbackLabel::Correct,
                    None,
                )
                .await;
            assert!(outcome.accepted);
        }

        assert!(
            trainer.weights().direct_text > before,
            "direct-text weight should rise after confirmed fuzzy matches"
        );
        // One fetch for initialize, exactly one more for the batch refresh.
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_weights_sum_to_one_after_any_adjustment() {
        let (mut trainer, _source) = trainer_with_counting_source().await;

        let labels = [
            FeedbackLabel::Correct,
            FeedbackLabel::Incorrect,
            FeedbackLabel::Partial,
        ];
        for (i, label) in labels.iter().cycle().take(25).enumerate() {
            let mut result = fuzzy_result(0.2 + (i % 8) as f64 / 10.0);
            result.match_kind = match i % 3 {
                0 => MatchKind::Fuzzy,
                1 => MatchKind::Keyword,
                _ => MatchKind::Partial,
            };
            trainer
                .record_feedback(&format!("query {}", i), &result, *label, Some("expected"))
                .await;
            assert!(
                (trainer.weights().total() - 1.0).abs() < 1e-6,
                "weights drifted at step {}",
                i
            );
        }
    }

    #[tokio::test]
    async fn test_malformed_feedback_dropped_not_failed() {
        let (mut trainer, _source) = trainer_with_counting_source().await;

        let outcome = trainer
            .record_feedback("", &fuzzy_result(0.8), FeedbackLabel::Correct, None)
            .await;
        assert!(!outcome.accepted);
        assert_eq!(trainer.stats().total_examples, 0);
    }

    #[tokio::test]
    async fn test_incorrect_low_score_mines_expected_answer_keywords() {
        let (mut trainer, _source) = trainer_with_counting_source().await;

        let mut result = fuzzy_result(0.2);
        result.match_kind = MatchKind::Partial;
        trainer
            .record_feedback(
                "licensing cost",
                &result,
                FeedbackLabel::Incorrect,
                Some("the license fee schedule lists all costs"),
            )
            .await;

        // "licensing"/"license" share a prefix; "cost"/"costs" too... but
        // "cost" is only 4 chars — prefix "cos" matches "costs".
        let synonyms = trainer.synonyms();
        assert!(
            synonyms.get("licensing").is_some() || synonyms.get("cost").is_some(),
            "expected mined synonyms, table: {:?}",
            synonyms
        );
    }

    #[tokio::test]
    async fn test_partial_feedback_only_adjusts_above_half_score() {
        let (mut trainer, _source) = trainer_with_counting_source().await;
        let before = trainer.weights();

        trainer
            .record_feedback("query", &fuzzy_result(0.4), FeedbackLabel::Partial, None)
            .await;
        assert_eq!(trainer.weights(), before, "low-score partial is a no-op");

        trainer
            .record_feedback("query", &fuzzy_result(0.8), FeedbackLabel::Partial, None)
            .await;
        assert!(trainer.weights().direct_text > before.direct_text);
    }

    #[tokio::test]
    async fn test_rolling_accuracy() {
        let (mut trainer, _source) = trainer_with_counting_source().await;

        for label in [
            FeedbackLabel::Correct,
            FeedbackLabel::Correct,
            FeedbackLabel::Partial,
            FeedbackLabel::Incorrect,
        ] {
            trainer
                .record_feedback("query", &fuzzy_result(0.8), label, None)
                .await;
        }

        // (2 + 0.5) / 4
        assert!((trainer.rolling_accuracy() - 0.625).abs() < 1e-9);
        let stats = trainer.stats();
        assert_eq!(stats.total_examples, 4);
        assert_eq!(stats.correct, 2);
        assert_eq!(stats.incorrect, 1);
        assert_eq!(stats.partial, 1);
    }

    #[tokio::test]
    async fn test_rolling_accuracy_drops_examples_outside_window() {
        let config = TrainerConfig {
            accuracy_window: 4,
            ..TrainerConfig::default()
        };
        let (mut trainer, _source) = trainer_with_config(config).await;

        // Two early failures, then four successes. Only the last four
        // examples fall inside the window, so the failures age out.
        for label in [
            FeedbackLabel::Incorrect,
            FeedbackLabel::Incorrect,
            FeedbackLabel::Correct,
            FeedbackLabel::Correct,
        ] {
            trainer
                .record_feedback("query", &fuzzy_result(0.8), label, None)
                .await;
        }
        // Window still spans both failures: (0 + 0 + 1 + 1) / 4.
        assert!((trainer.rolling_accuracy() - 0.5).abs() < 1e-9);

        for _ in 0..2 {
            trainer
                .record_feedback("query", &fuzzy_result(0.8), FeedbackLabel::Correct, None)
                .await;
        }
        assert_eq!(trainer.stats().total_examples, 6);
        assert!(
            (trainer.rolling_accuracy() - 1.0).abs() < 1e-9,
            "failures outside the window must not count"
        );
    }

    #[tokio::test]
    async fn test_partial_gate_is_configurable() {
        let config = TrainerConfig {
            min_partial_score: 0.9,
            ..TrainerConfig::default()
        };
        let (mut trainer, _source) = trainer_with_config(config).await;
        let before = trainer.weights();

        // Above the default 0.5 gate but below the configured one: no-op.
        trainer
            .record_feedback("query", &fuzzy_result(0.8), FeedbackLabel::Partial, None)
            .await;
        assert_eq!(trainer.weights(), before);

        trainer
            .record_feedback("query", &fuzzy_result(0.95), FeedbackLabel::Partial, None)
            .await;
        assert!(trainer.weights().direct_text > before.direct_text);
    }

    #[tokio::test]
    async fn test_incorrect_mining_gate_is_configurable() {
        let config = TrainerConfig {
            low_score_threshold: 0.7,
            ..TrainerConfig::default()
        };
        let (mut trainer, _source) = trainer_with_config(config).await;

        // Score 0.6 sits above the default 0.3 gate but below the raised
        // one, so mining now runs.
        let mut result = fuzzy_result(0.6);
        result.match_kind = MatchKind::Partial;
        trainer
            .record_feedback(
                "licensing cost",
                &result,
                FeedbackLabel::Incorrect,
                Some("the license fee schedule lists all costs"),
            )
            .await;
        assert!(!trainer.synonyms().is_empty());
    }

    #[tokio::test]
    async fn test_export_import_reproduces_rolling_accuracy() {
        let (mut trainer, _source) = trainer_with_counting_source().await;
        for label in [
            FeedbackLabel::Correct,
            FeedbackLabel::Incorrect,
            FeedbackLabel::Partial,
        ] {
            trainer
                .record_feedback("query", &fuzzy_result(0.7), label, None)
                .await;
        }
        let exported = trainer.export_examples().unwrap();
        let original_accuracy = trainer.rolling_accuracy();

        let (mut fresh, _source2) = trainer_with_counting_source().await;
        let imported = fresh.import_examples(&exported).unwrap();
        assert_eq!(imported, 3);
        assert_eq!(fresh.rolling_accuracy(), original_accuracy);
    }

    #[tokio::test]
    async fn test_import_malformed_fails() {
        let (mut trainer, _source) = trainer_with_counting_source().await;
        assert!(matches!(
            trainer.import_examples("not json"),
            Err(KbError::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_suggest_improvements_groups_failures() {
        let (mut trainer, _source) = trainer_with_counting_source().await;

        let mut result = fuzzy_result(0.6);
        result.match_kind = MatchKind::Keyword;
        for i in 0..5 {
            trainer
                .record_feedback(
                    &format!("how do i file form {}", i),
                    &result,
                    FeedbackLabel::Incorrect,
                    None,
                )
                .await;
        }
        trainer
            .record_feedback("one-off question", &result, FeedbackLabel::Incorrect, None)
            .await;

        let suggestions = trainer.suggest_improvements();
        assert!(suggestions
            .iter()
            .any(|s| s.description.contains("starting with 'how'") && s.occurrences == 5));
        // Single failures stay below the reporting threshold.
        assert!(!suggestions
            .iter()
            .any(|s| s.description.contains("one-off")));
    }

    #[test]
    fn test_shares_affix() {
        assert!(shares_affix("license", "licensing"));
        assert!(shares_affix("bonding", "according")); // shared "ing" suffix
        assert!(!shares_affix("fee", "fee"));
        assert!(!shares_affix("fee", "cost"));
    }

    #[test]
    fn test_query_pattern_keys() {
        assert_eq!(query_pattern("how do I renew"), "starting with 'how'");
        assert_eq!(
            query_pattern("georgia license requirements"),
            "containing 'requirements'"
        );
    }
}
