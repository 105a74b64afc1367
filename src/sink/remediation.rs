//! Remediation actor: access restriction for sensitive files
//!
//! The metadata sink calls the actor as a best-effort side call: its failure
//! is logged and never fails the metadata update.

use crate::classify::Label;
use crate::storage::{MetadataStore, Restriction};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("remediation transport error: {0}")]
    Transport(String),
    #[error("remediation rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("access policy error: {0}")]
    Policy(String),
}

/// Request sent from the metadata sink to the remediation actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationRequest {
    pub file_path: String,
    pub classification: Label,
    #[serde(default)]
    pub message: String,
}

impl RemediationRequest {
    pub fn new(file_path: impl Into<String>, classification: Label) -> Self {
        Self {
            file_path: file_path.into(),
            classification,
            message: format!("Sensitive data classified as '{}' detected.", classification),
        }
    }
}

/// Applies access-control changes for a classified file.
///
/// Returns a human-readable status line; callers do not parse it.
#[async_trait]
pub trait RemediationActor: Send + Sync {
    async fn remediate(&self, request: &RemediationRequest) -> Result<String, RemediationError>;
}

/// Remote remediation actor reached over HTTP.
pub struct HttpRemediationActor {
    client: reqwest::Client,
    url: String,
}

impl HttpRemediationActor {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl RemediationActor for HttpRemediationActor {
    async fn remediate(&self, request: &RemediationRequest) -> Result<String, RemediationError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| RemediationError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemediationError::Transport(e.to_string()))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(RemediationError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Policy engine port: tighten access on a directory.
pub trait AccessPolicy: Send + Sync {
    fn restrict(&self, restriction: &Restriction) -> Result<(), RemediationError>;
}

/// Access policy that records each restriction in the metadata store ledger.
pub struct LedgerAccessPolicy {
    store: Arc<dyn MetadataStore>,
}

impl LedgerAccessPolicy {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }
}

impl AccessPolicy for LedgerAccessPolicy {
    fn restrict(&self, restriction: &Restriction) -> Result<(), RemediationError> {
        self.store
            .record_restriction(restriction)
            .map_err(|e| RemediationError::Policy(e.to_string()))
    }
}

/// In-process remediation: restricts the parent directory of sensitive files.
pub struct AccessRestrictor {
    policy: Arc<dyn AccessPolicy>,
}

impl AccessRestrictor {
    pub fn new(policy: Arc<dyn AccessPolicy>) -> Self {
        Self { policy }
    }
}

/// Parent directory of a path inside the container; empty for top-level files.
fn parent_directory(file_path: &str) -> &str {
    file_path.rfind('/').map_or("", |i| &file_path[..i])
}

#[async_trait]
impl RemediationActor for AccessRestrictor {
    async fn remediate(&self, request: &RemediationRequest) -> Result<String, RemediationError> {
        if !request.classification.is_sensitive() {
            tracing::info!(
                file_path = %request.file_path,
                classification = %request.classification,
                "no remediation action defined"
            );
            return Ok(format!(
                "Remediation for {} status: Not Applicable, Action: No action needed",
                request.file_path
            ));
        }

        let restriction = Restriction {
            file_path: request.file_path.clone(),
            directory: parent_directory(&request.file_path).to_string(),
            classification: request.classification,
            restricted_at: Utc::now(),
        };
        self.policy.restrict(&restriction)?;
        tracing::info!(
            file_path = %request.file_path,
            directory = %restriction.directory,
            classification = %request.classification,
            "access restricted"
        );

        Ok(format!(
            "Remediation for {} status: Completed, Action: ACL Update",
            request.file_path
        ))
    }
}
