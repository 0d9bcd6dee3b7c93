//! Configuration for VoiceKB
//!
//! Every empirically tuned constant in the scoring and caching paths lives
//! here as a defaulted field rather than a hard constant: the region boost
//! and the low-confidence result widening in particular are tuned numbers
//! with no documented derivation, so deployments can override them from a
//! JSON config file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KbError, Result};

/// Named scoring weights blending the similarity signals into one score.
///
/// Owned and mutated only by the trainer; the index reads an immutable copy
/// taken at refresh time. Components always sum to 1.0 after any adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Weight of direct text similarity (query vs. question/answer).
    pub direct_text: f64,
    /// Weight of keyword overlap against question+answer+tags.
    pub keyword: f64,
    /// Weight of the variant-substring bonus.
    pub variant: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            direct_text: 0.4,
            keyword: 0.4,
            variant: 0.2,
        }
    }
}

impl ScoringWeights {
    /// Sum of all components.
    pub fn total(&self) -> f64 {
        self.direct_text + self.keyword + self.variant
    }

    /// Rescale components so they sum to 1.0. A degenerate all-zero vector
    /// resets to the defaults instead of dividing by zero.
    pub fn normalize(&mut self) {
        let total = self.total();
        if total <= f64::EPSILON {
            *self = Self::default();
            return;
        }
        self.direct_text /= total;
        self.keyword /= total;
        self.variant /= total;
    }
}

/// Tunables for the index search path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchTuning {
    /// Multiplier applied when the query names a candidate's region.
    pub region_boost: f64,
    /// Minimum combined score a candidate must exceed to be returned.
    /// Deliberately low: voice queries are noisy and near-misses are useful.
    pub prune_threshold: f64,
    /// Below this fuzzy-match score the matcher reports 0.0 outright.
    pub match_threshold: f64,
    /// When the top score falls below this, up to `2 x limit` results are
    /// returned so the caller can run its own disambiguation.
    pub low_confidence_cutoff: f64,
    /// Default result count when the caller does not specify one.
    pub default_limit: usize,
}

impl Default for SearchTuning {
    fn default() -> Self {
        Self {
            region_boost: 1.5,
            prune_threshold: 0.1,
            match_threshold: 0.3,
            low_confidence_cutoff: 0.5,
            default_limit: 5,
        }
    }
}

/// Tunables for the retriever result cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached (query, filters) entries before LRU eviction.
    pub capacity: usize,
    /// Time-to-live for a cached result list, in seconds.
    pub ttl_secs: u64,
    /// Minimum interval between lazy expired-entry sweeps, in seconds.
    pub purge_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            ttl_secs: 300,
            purge_interval_secs: 60,
        }
    }
}

/// Tunables for the feedback trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Step size for weight nudges on feedback.
    pub learning_rate: f64,
    /// Number of recorded examples between pushes to the retriever.
    pub batch_size: usize,
    /// Window size for the rolling accuracy measure.
    pub accuracy_window: usize,
    /// Minimum failure count before a query pattern is surfaced as a
    /// suggestion.
    pub min_pattern_failures: usize,
    /// Minimum score for partial feedback to apply the half-strength
    /// correct adjustment.
    pub min_partial_score: f64,
    /// Score below which incorrect feedback mines the expected answer for
    /// synonym candidates.
    pub low_score_threshold: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            batch_size: 10,
            accuracy_window: 100,
            min_pattern_failures: 3,
            min_partial_score: 0.5,
            low_score_threshold: 0.3,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchTuning,
    pub cache: CacheConfig,
    pub trainer: TrainerConfig,
    /// Initial scoring weights (replaced by trainer updates at runtime).
    pub weights: ScoringWeights,
    /// Timeout applied to record loading during initialize/refresh, seconds.
    pub refresh_timeout_secs: u64,
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for any
    /// field the file omits.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            KbError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|e| {
            KbError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    /// Timeout for record loading, defaulting to 30 seconds when unset.
    pub fn refresh_timeout(&self) -> std::time::Duration {
        let secs = if self.refresh_timeout_secs == 0 {
            30
        } else {
            self.refresh_timeout_secs
        };
        std::time::Duration::from_secs(secs)
    }
}
