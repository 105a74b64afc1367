//! Classification core
//!
//! The orchestrator drives one run per file event: extraction, concurrent
//! fan-out to the registered classifier adapters, merge by label precedence,
//! and a single dispatch of the merged result.

pub mod adapters;
mod merger;
mod orchestrator;
mod traits;
mod types;

pub use merger::{merge, Contribution, Verdict};
pub use orchestrator::{AdapterOutcome, BatchReport, ClassificationOrchestrator, OrchestratorError};
pub use traits::{AdapterUnavailable, ClassifierAdapter, ClassifierRegistry};
pub use types::{
    ChangeKind, ClassificationHints, ClassificationResult, FileEvent, Label, PartialResult,
    UnknownLabel,
};
