//! Storage trait definitions

use crate::classify::Label;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Invalid stored label: {0}")]
    Label(String),

    #[error("Value out of range for {field}: {value}")]
    OutOfRange { field: &'static str, value: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Stable record key for a file path: URL-safe, unpadded base64.
pub fn record_id(file_path: &str) -> String {
    URL_SAFE_NO_PAD.encode(file_path.as_bytes())
}

/// Persisted classification metadata for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub id: String,
    pub file_path: String,
    pub file_url: String,
    pub file_size: u64,
    pub classification: Label,
    pub confidence: f64,
    pub detection_details: serde_json::Value,
    pub analysis_timestamp: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Replaced a record whose analysis was not newer
    Updated,
    /// Ignored: the stored analysis is newer than the incoming one
    Stale,
}

impl UpsertOutcome {
    pub fn is_written(&self) -> bool {
        !matches!(self, Self::Stale)
    }
}

/// An access restriction applied by remediation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restriction {
    pub file_path: String,
    /// Directory whose access was tightened
    pub directory: String,
    pub classification: Label,
    pub restricted_at: DateTime<Utc>,
}

/// Trait for metadata storage backends
///
/// Implementations must be thread-safe (Send + Sync): the metadata sink is
/// shared across concurrently processed events.
pub trait MetadataStore: Send + Sync {
    /// Insert or replace the record keyed by `record.id`.
    ///
    /// A record whose `analysis_timestamp` is older than the stored one is
    /// not written, so redelivered or reordered results never roll back a
    /// newer analysis.
    fn upsert(&self, record: &MetadataRecord) -> StorageResult<UpsertOutcome>;

    /// Load the record for a file path
    fn load(&self, file_path: &str) -> StorageResult<Option<MetadataRecord>>;

    /// Records ordered by most recently updated first
    fn list(&self, limit: Option<usize>) -> StorageResult<Vec<MetadataRecord>>;

    /// Number of stored records
    fn count(&self) -> StorageResult<usize>;

    /// Append an access restriction to the ledger
    fn record_restriction(&self, restriction: &Restriction) -> StorageResult<()>;

    /// All restrictions, oldest first
    fn restrictions(&self) -> StorageResult<Vec<Restriction>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: MetadataStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
