//! Common test utilities for pipeline integration tests
//!
//! Mock classification backends run on wiremock servers; file content lives
//! in temporary files read through the real `BlobReader`.

pub mod backends;
pub mod fixtures;

pub use backends::{
    mount_completion, mount_entities, mount_model_score, mount_remediation, Backends,
};
pub use fixtures::{notification, write_document, CountingDispatcher, PipelineHarness};
