//! Retriever: the service façade over the in-memory index.
//!
//! Owns the current index snapshot and the result cache, and is the only
//! integration point the rest of the application sees. Snapshots are swapped
//! wholesale on refresh — concurrent searches keep reading the old snapshot
//! and never observe a half-built index. The search path is synchronous and
//! total: a voice agent must always get a result list back, so an
//! uninitialized retriever answers with an empty list rather than an error.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::ResultCache;
use crate::config::{Config, ScoringWeights};
use crate::error::{KbError, Result};
use crate::index::{IndexSnapshot, Record, SearchResult};
use crate::preprocess::SynonymTable;
use crate::source::RecordSource;

/// A search response: ranked results plus the measured retrieval latency.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    #[serde(rename = "latencyMs")]
    pub latency_ms: f64,
}

/// Service façade owning the index snapshot and result cache.
pub struct Retriever {
    source: Arc<dyn RecordSource>,
    config: Config,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    cache: Mutex<ResultCache>,
    /// Latest training state pushed by the trainer; folded into the index as
    /// an immutable copy at the next (re)build.
    training_state: Mutex<(ScoringWeights, SynonymTable)>,
}

impl Retriever {
    /// Create a retriever over a record source. No records are loaded until
    /// `initialize` is called.
    pub fn new(source: Arc<dyn RecordSource>, config: Config) -> Self {
        let cache = Mutex::new(ResultCache::new(&config.cache));
        let weights = config.weights;
        Self {
            source,
            config,
            snapshot: RwLock::new(None),
            cache,
            training_state: Mutex::new((weights, SynonymTable::new())),
        }
    }

    /// Load the full record set and build the first snapshot. An empty or
    /// unreachable record source is fatal: operating with zero records is
    /// never correct, so this must block startup.
    pub async fn initialize(&self) -> Result<()> {
        let records = self
            .fetch_records()
            .await
            .map_err(|e| KbError::Initialization(e.to_string()))?;
        if records.is_empty() {
            return Err(KbError::Initialization(
                "record source returned no records".to_string(),
            ));
        }

        let count = records.len();
        self.install_snapshot(records);
        info!(records = count, "knowledge index initialized");
        Ok(())
    }

    /// Reload records and atomically swap in a new snapshot, then clear the
    /// cache so stale results referencing the old knowledge base cannot
    /// survive. On failure the previous snapshot remains authoritative.
    pub async fn refresh_index(&self) -> Result<()> {
        let records = self
            .fetch_records()
            .await
            .map_err(|e| KbError::Refresh(e.to_string()))?;
        if records.is_empty() {
            return Err(KbError::Refresh(
                "record source returned no records".to_string(),
            ));
        }

        let count = records.len();
        self.install_snapshot(records);
        self.cache.lock().expect("cache lock poisoned").clear();
        info!(records = count, "knowledge index refreshed");
        Ok(())
    }

    /// Search the current snapshot. Never fails: empty, malformed, or
    /// unmatched queries — and an uninitialized retriever — all produce an
    /// empty result list.
    pub fn search(
        &self,
        query: &str,
        category: Option<&str>,
        region: Option<&str>,
        limit: Option<usize>,
        use_cache: bool,
    ) -> SearchResponse {
        let started = Instant::now();
        let limit = limit.unwrap_or(self.config.search.default_limit);
        let key = ResultCache::key(query, category, region, limit);

        if use_cache {
            let mut cache = self.cache.lock().expect("cache lock poisoned");
            if let Some(results) = cache.get(key) {
                debug!(query, "cache hit");
                return SearchResponse {
                    results,
                    latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                };
            }
        }

        let snapshot = self
            .snapshot
            .read()
            .expect("snapshot lock poisoned")
            .clone();
        let results = match snapshot {
            Some(snapshot) => snapshot.search(query, category, region, limit),
            None => {
                warn!("search before initialization; returning empty result list");
                Vec::new()
            }
        };

        if use_cache && !results.is_empty() {
            self.cache
                .lock()
                .expect("cache lock poisoned")
                .insert(key, results.clone());
        }

        SearchResponse {
            results,
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }

    /// Replace the training state used for future snapshot builds. Called by
    /// the trainer at batch boundaries, immediately before `refresh_index`.
    pub fn apply_training(&self, weights: ScoringWeights, synonyms: SynonymTable) {
        let mut state = self.training_state.lock().expect("training state lock poisoned");
        *state = (weights, synonyms);
        debug!(
            direct = weights.direct_text,
            keyword = weights.keyword,
            variant = weights.variant,
            "training state updated"
        );
    }

    /// Whether a snapshot has been installed.
    pub fn is_initialized(&self) -> bool {
        self.snapshot
            .read()
            .expect("snapshot lock poisoned")
            .is_some()
    }

    /// Number of records in the current snapshot (0 before initialization).
    pub fn record_count(&self) -> usize {
        self.snapshot
            .read()
            .expect("snapshot lock poisoned")
            .as_ref()
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// The weight vector the current snapshot scores with.
    pub fn active_weights(&self) -> ScoringWeights {
        self.snapshot
            .read()
            .expect("snapshot lock poisoned")
            .as_ref()
            .map(|s| s.weights())
            .unwrap_or(self.config.weights)
    }

    async fn fetch_records(&self) -> Result<Vec<Record>> {
        tokio::time::timeout(self.config.refresh_timeout(), self.source.fetch_records())
            .await
            .map_err(|_| KbError::Source("record fetch timed out".to_string()))?
    }

    fn install_snapshot(&self, records: Vec<Record>) {
        let (weights, synonyms) = self
            .training_state
            .lock()
            .expect("training state lock poisoned")
            .clone();
        let snapshot = IndexSnapshot::build(
            records,
            weights,
            synonyms,
            self.config.search.clone(),
        );
        *self.snapshot.write().expect("snapshot lock poisoned") = Some(Arc::new(snapshot));
    }
}
