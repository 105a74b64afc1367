//! Downstream consumers of classification results
//!
//! - **Dispatch**: the orchestrator's one-shot hand-off of a result
//! - **MetadataSink**: idempotent upsert plus the remediation decision
//! - **Remediation**: best-effort access restriction for sensitive files

mod dispatch;
mod metadata;
mod remediation;

pub use dispatch::{
    DispatchError, DispatchReceipt, HttpDispatcher, LocalDispatcher, MetadataDispatcher,
    MetadataPayload,
};
pub use metadata::{requires_remediation, MetadataSink, SinkResponse};
pub use remediation::{
    AccessPolicy, AccessRestrictor, HttpRemediationActor, LedgerAccessPolicy, RemediationActor,
    RemediationError, RemediationRequest,
};
