//! Dispatch of classification results to the metadata sink
//!
//! The orchestrator hands each result over exactly once per run through a
//! `MetadataDispatcher`. The response status is the only success signal; a
//! failed dispatch is surfaced to the queue layer for redelivery.

use super::metadata::MetadataSink;
use crate::classify::{ClassificationResult, Label};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Wire payload accepted by the metadata sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPayload {
    pub file_path: String,
    pub file_url: String,
    #[serde(default)]
    pub file_size: u64,
    pub classification: Label,
    pub confidence: f64,
    #[serde(default)]
    pub detection_details: serde_json::Value,
    pub analysis_timestamp: DateTime<Utc>,
}

impl From<&ClassificationResult> for MetadataPayload {
    fn from(result: &ClassificationResult) -> Self {
        let details = result
            .evidence_by_source
            .iter()
            .map(|(source, evidence)| (source.clone(), evidence.clone()))
            .collect::<serde_json::Map<_, _>>();

        Self {
            file_path: result.file_path.clone(),
            file_url: result.file_locator.clone(),
            file_size: result.size_bytes,
            classification: result.label,
            confidence: result.confidence,
            detection_details: serde_json::Value::Object(details),
            analysis_timestamp: result.classified_at,
        }
    }
}

/// Successful dispatch acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("metadata sink unreachable: {0}")]
    Unreachable(String),
    #[error("metadata sink rejected dispatch with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("metadata sink did not answer within {0:?}")]
    TimedOut(Duration),
}

/// Synchronous request/response channel to the metadata sink.
#[async_trait]
pub trait MetadataDispatcher: Send + Sync {
    async fn dispatch(&self, payload: &MetadataPayload) -> Result<DispatchReceipt, DispatchError>;
}

/// Dispatches to a remote metadata sink over HTTP.
pub struct HttpDispatcher {
    client: reqwest::Client,
    url: String,
}

impl HttpDispatcher {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl MetadataDispatcher for HttpDispatcher {
    async fn dispatch(&self, payload: &MetadataPayload) -> Result<DispatchReceipt, DispatchError> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| DispatchError::Unreachable(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| DispatchError::Unreachable(e.to_string()))?;

        if (200..300).contains(&status) {
            Ok(DispatchReceipt { status, body })
        } else {
            Err(DispatchError::Rejected { status, body })
        }
    }
}

/// Dispatches to a metadata sink in the same process.
pub struct LocalDispatcher {
    sink: Arc<MetadataSink>,
}

impl LocalDispatcher {
    pub fn new(sink: Arc<MetadataSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl MetadataDispatcher for LocalDispatcher {
    async fn dispatch(&self, payload: &MetadataPayload) -> Result<DispatchReceipt, DispatchError> {
        let response = self.sink.handle(payload).await;
        if response.is_success() {
            Ok(DispatchReceipt {
                status: response.status,
                body: response.body,
            })
        } else {
            Err(DispatchError::Rejected {
                status: response.status,
                body: response.body,
            })
        }
    }
}
