//! Lakesentry: sensitive-data classification for data-lake files
//!
//! Reacts to files landing in a data lake, classifies their sensitivity with
//! several independent backends, records the verdict as metadata and restricts
//! access when sensitive data is found.
//!
//! # Data flow
//!
//! storage change → [`IngestionAdapter`] → queue → [`ClassificationOrchestrator`]
//! (extraction, classifier fan-out, merge) → [`MetadataSink`] → remediation
//!
//! # Example
//!
//! ```
//! use lakesentry::{merge, Label, PartialResult};
//!
//! let verdict = merge(&[
//!     PartialResult::new("entity-detection", Label::None, 1.0),
//!     PartialResult::new("model-endpoint", Label::Pii, 0.6),
//! ]);
//! assert_eq!(verdict.label(), Label::Pii);
//! assert_eq!(verdict.confidence(), 0.6);
//! ```

pub mod classify;
pub mod config;
pub mod extract;
pub mod ingest;
pub mod pipeline;
pub mod queue;
pub mod server;
pub mod sink;
pub mod storage;

pub use classify::{
    merge, AdapterUnavailable, ChangeKind, ClassificationOrchestrator, ClassificationResult,
    ClassifierAdapter, ClassifierRegistry, FileEvent, Label, OrchestratorError, PartialResult,
    Verdict,
};
pub use config::{ConfigError, SentinelConfig};
pub use extract::{BlobReader, ExtractionError, ExtractionPort};
pub use ingest::{IngestOutcome, IngestionAdapter, StorageNotification};
pub use pipeline::{Pipeline, PipelineError};
pub use sink::{MetadataDispatcher, MetadataPayload, MetadataSink, RemediationActor};
pub use storage::{MemoryStore, MetadataRecord, MetadataStore, OpenStore, SqliteStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
