//! Record sources: the external data collaborator seam.
//!
//! The retriever treats record loading as a simple bulk fetch; anything able
//! to produce the full record list can back it — a JSON file here, a
//! database or HTTP service in a larger deployment.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{KbError, Result};
use crate::index::Record;

/// Supplies the full knowledge-base record list on initialize/refresh.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch every record. The retriever rebuilds the index from the
    /// complete list, so partial fetches must fail rather than return a
    /// subset.
    async fn fetch_records(&self) -> Result<Vec<Record>>;
}

/// Loads records from a JSON file containing an array of record objects.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    /// Create a source reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordSource for JsonFileSource {
    async fn fetch_records(&self) -> Result<Vec<Record>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            KbError::Source(format!(
                "Failed to read records from {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let records: Vec<Record> = serde_json::from_str(&content).map_err(|e| {
            KbError::Source(format!(
                "Failed to parse records from {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(records)
    }
}

/// Serves a fixed in-memory record list. Used by tests and the CLI's
/// training demo; `replace` simulates an upstream knowledge-base edit.
pub struct StaticSource {
    records: std::sync::Mutex<Vec<Record>>,
}

impl StaticSource {
    /// Create a source over a fixed record list.
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: std::sync::Mutex::new(records),
        }
    }

    /// Replace the record list served on the next fetch.
    pub fn replace(&self, records: Vec<Record>) {
        *self.records.lock().expect("record list lock poisoned") = records;
    }
}

#[async_trait]
impl RecordSource for StaticSource {
    async fn fetch_records(&self) -> Result<Vec<Record>> {
        Ok(self.records.lock().expect("record list lock poisoned").clone())
    }
}
