//! VoiceKB - In-memory knowledge retrieval backend for voice assistants

pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod matcher;
pub mod preprocess;
pub mod retriever;
pub mod source;
pub mod trainer;

pub use config::Config;
pub use error::{KbError, Result};
pub use index::{MatchKind, Record, SearchResult};
pub use retriever::{Retriever, SearchResponse};
pub use trainer::{FeedbackLabel, Trainer};
