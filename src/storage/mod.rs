//! Storage backends for classification metadata
//!
//! The metadata sink persists through the `MetadataStore` trait. `SqliteStore`
//! is the persistent implementation; `MemoryStore` serves tests and one-shot
//! runs.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    record_id, MetadataRecord, MetadataStore, OpenStore, Restriction, StorageError,
    StorageResult, UpsertOutcome,
};
