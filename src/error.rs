//! Error types for VoiceKB
//!
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations. Search-path code never returns these: the
//! search API is total and reports "no match" as an empty result list. Only
//! resource acquisition (record loading, refresh, config parsing) and
//! malformed training input surface as errors.

use thiserror::Error;

/// The primary error type for VoiceKB operations.
#[derive(Error, Debug)]
pub enum KbError {
    /// Configuration-related errors (unreadable config file, bad values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Startup failed: the record source yielded nothing usable. Fatal —
    /// a knowledge backend with zero records is never correct.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// A record source could not be read or produced malformed records.
    #[error("Record source error: {0}")]
    Source(String),

    /// An index refresh failed mid-flight. The previous snapshot remains
    /// authoritative; callers may retry.
    #[error("Refresh error: {0}")]
    Refresh(String),

    /// Malformed feedback event or unreadable training log.
    #[error("Training error: {0}")]
    Training(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for VoiceKB operations.
pub type Result<T> = std::result::Result<T, KbError>;
