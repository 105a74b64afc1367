//! Core types for the classification pipeline
//!
//! `FileEvent` enters the orchestrator, each classifier adapter produces a
//! `PartialResult`, and the merger folds those into the authoritative
//! `ClassificationResult`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Sensitivity label, declared in ascending precedence order.
///
/// The derived `Ord` is the merge precedence: `Pii` > `Confidential` >
/// `Unknown` > `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    None,
    Unknown,
    Confidential,
    #[serde(rename = "PII")]
    Pii,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Unknown => "Unknown",
            Self::Confidential => "Confidential",
            Self::Pii => "PII",
        }
    }

    /// Whether this label marks the file as sensitive.
    pub fn is_sensitive(&self) -> bool {
        matches!(self, Self::Pii | Self::Confidential)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the four label names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized label: {0}")]
pub struct UnknownLabel(pub String);

impl FromStr for Label {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pii" => Ok(Self::Pii),
            "confidential" => Ok(Self::Confidential),
            "unknown" => Ok(Self::Unknown),
            "none" => Ok(Self::None),
            _ => Err(UnknownLabel(s.to_string())),
        }
    }
}

/// Kind of storage change that produced a file event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Updated,
}

impl ChangeKind {
    /// Map a storage notification event type to a change kind.
    ///
    /// Accepts fully-qualified names (`Microsoft.Storage.BlobCreated`) as
    /// well as bare ones (`BlobUpdated`, `Created`). Anything else, deletes
    /// included, yields `None`.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        let short = event_type.rsplit('.').next().unwrap_or(event_type);
        match short {
            "BlobCreated" | "Created" => Some(Self::Created),
            "BlobUpdated" | "Updated" => Some(Self::Updated),
            _ => None,
        }
    }
}

/// Normalized record of a file creation or update, queued for classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEvent {
    /// Path relative to the root container; the idempotency key downstream
    pub file_path: String,
    /// Where the file content can be fetched from
    #[serde(alias = "fileUrl")]
    pub file_locator: String,
    #[serde(alias = "fileSize", default)]
    pub size_bytes: u64,
    pub change_kind: ChangeKind,
    #[serde(alias = "timestamp")]
    pub observed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl FileEvent {
    pub fn new(
        file_path: impl Into<String>,
        file_locator: impl Into<String>,
        size_bytes: u64,
        change_kind: ChangeKind,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            file_locator: file_locator.into(),
            size_bytes,
            change_kind,
            observed_at: Utc::now(),
            e_tag: None,
            last_modified: None,
        }
    }

    pub fn with_etag(mut self, e_tag: impl Into<String>) -> Self {
        self.e_tag = Some(e_tag.into());
        self
    }

    pub fn with_last_modified(mut self, last_modified: impl Into<String>) -> Self {
        self.last_modified = Some(last_modified.into());
        self
    }

    /// Hints handed to every classifier adapter for this event.
    pub fn hints(&self) -> ClassificationHints {
        ClassificationHints {
            file_path: self.file_path.clone(),
            size_bytes: self.size_bytes,
            change_kind: self.change_kind,
        }
    }
}

/// Context passed alongside the extracted text to each adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationHints {
    pub file_path: String,
    pub size_bytes: u64,
    pub change_kind: ChangeKind,
}

/// One classifier adapter's verdict for a given text.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialResult {
    pub source_id: String,
    pub label: Label,
    /// Always within [0, 1]
    pub confidence: f64,
    pub evidence: serde_json::Value,
}

impl PartialResult {
    /// Create a partial result. Confidence is clamped into [0, 1]; NaN becomes 0.
    pub fn new(source_id: impl Into<String>, label: Label, confidence: f64) -> Self {
        Self {
            source_id: source_id.into(),
            label,
            confidence: clamp_confidence(confidence),
            evidence: serde_json::Value::Null,
        }
    }

    pub fn with_evidence(mut self, evidence: serde_json::Value) -> Self {
        self.evidence = evidence;
        self
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// The merged, authoritative verdict for a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub file_path: String,
    pub file_locator: String,
    pub size_bytes: u64,
    pub label: Label,
    pub confidence: f64,
    pub evidence_by_source: BTreeMap<String, serde_json::Value>,
    pub classified_at: DateTime<Utc>,
}
