//! Metadata sink: persists classification results and triggers remediation
//!
//! Upserts are keyed by the stable record id of the file path, so redelivered
//! results overwrite instead of duplicating. After a written upsert, sensitive
//! results are handed to the remediation actor as a best-effort side call.

use super::dispatch::MetadataPayload;
use super::remediation::{RemediationActor, RemediationRequest};
use crate::classify::Label;
use crate::storage::{record_id, MetadataRecord, MetadataStore, UpsertOutcome};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Status/body pair returned to whoever delivered the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkResponse {
    pub status: u16,
    pub body: String,
}

impl SinkResponse {
    fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Whether a result warrants remediation.
///
/// Evaluates as `PII || (Confidential && confidence > 0.8)`: any PII
/// triggers regardless of confidence.
pub fn requires_remediation(label: Label, confidence: f64) -> bool {
    label == Label::Pii || (label == Label::Confidential && confidence > 0.8)
}

pub struct MetadataSink {
    store: Arc<dyn MetadataStore>,
    remediation: Option<Arc<dyn RemediationActor>>,
    remediation_timeout: Duration,
}

impl MetadataSink {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            remediation: None,
            remediation_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_remediation(mut self, actor: Arc<dyn RemediationActor>, timeout: Duration) -> Self {
        self.remediation = Some(actor);
        self.remediation_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// Handle a raw request body, as delivered over HTTP.
    pub async fn handle_body(&self, body: &[u8]) -> SinkResponse {
        if body.iter().all(u8::is_ascii_whitespace) {
            return SinkResponse::new(400, "Please pass a request body with file metadata.");
        }
        match serde_json::from_slice::<MetadataPayload>(body) {
            Ok(payload) => self.handle(&payload).await,
            Err(e) => SinkResponse::new(400, format!("Invalid file metadata: {}", e)),
        }
    }

    /// Upsert the payload and, when warranted, remediate.
    pub async fn handle(&self, payload: &MetadataPayload) -> SinkResponse {
        let record = MetadataRecord {
            id: record_id(&payload.file_path),
            file_path: payload.file_path.clone(),
            file_url: payload.file_url.clone(),
            file_size: payload.file_size,
            classification: payload.classification,
            confidence: payload.confidence,
            detection_details: payload.detection_details.clone(),
            analysis_timestamp: payload.analysis_timestamp,
            last_updated: Utc::now(),
        };

        let outcome = match self.store.upsert(&record) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(file_path = %payload.file_path, error = %e, "metadata upsert failed");
                return SinkResponse::new(500, format!("Error processing request: {}", e));
            }
        };

        if outcome == UpsertOutcome::Stale {
            tracing::info!(file_path = %payload.file_path, "stored analysis is newer, update ignored");
            return SinkResponse::new(
                200,
                format!("Metadata for {} already reflects a newer analysis", payload.file_path),
            );
        }
        tracing::info!(
            file_path = %payload.file_path,
            classification = %payload.classification,
            ?outcome,
            "metadata upserted"
        );

        if requires_remediation(payload.classification, payload.confidence) {
            self.remediate(payload).await;
        }

        SinkResponse::new(200, format!("Metadata updated for {}", payload.file_path))
    }

    /// Best-effort remediation call; failures and timeouts are only logged.
    async fn remediate(&self, payload: &MetadataPayload) {
        let Some(actor) = &self.remediation else {
            tracing::warn!(file_path = %payload.file_path, "sensitive data detected but no remediation actor configured");
            return;
        };

        tracing::info!(
            file_path = %payload.file_path,
            classification = %payload.classification,
            "sensitive data detected, triggering remediation"
        );
        let request = RemediationRequest::new(&payload.file_path, payload.classification);
        match tokio::time::timeout(self.remediation_timeout, actor.remediate(&request)).await {
            Ok(Ok(status)) => tracing::info!(file_path = %payload.file_path, %status, "remediation triggered"),
            Ok(Err(e)) => tracing::warn!(file_path = %payload.file_path, error = %e, "remediation failed"),
            Err(_) => tracing::warn!(
                file_path = %payload.file_path,
                timeout = ?self.remediation_timeout,
                "remediation timed out"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::remediation::RemediationError;
    use crate::storage::{MemoryStore, MetadataRecord, Restriction, StorageError, StorageResult};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingActor {
        calls: Mutex<Vec<RemediationRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl RemediationActor for RecordingActor {
        async fn remediate(&self, request: &RemediationRequest) -> Result<String, RemediationError> {
            self.calls.lock().unwrap().push(request.clone());
            if self.fail {
                Err(RemediationError::Rejected {
                    status: 500,
                    body: "nope".into(),
                })
            } else {
                Ok("done".into())
            }
        }
    }

    struct BrokenStore;

    impl MetadataStore for BrokenStore {
        fn upsert(&self, _record: &MetadataRecord) -> StorageResult<UpsertOutcome> {
            Err(StorageError::LockPoisoned)
        }
        fn load(&self, _file_path: &str) -> StorageResult<Option<MetadataRecord>> {
            Ok(None)
        }
        fn list(&self, _limit: Option<usize>) -> StorageResult<Vec<MetadataRecord>> {
            Ok(Vec::new())
        }
        fn count(&self) -> StorageResult<usize> {
            Ok(0)
        }
        fn record_restriction(&self, _restriction: &Restriction) -> StorageResult<()> {
            Ok(())
        }
        fn restrictions(&self) -> StorageResult<Vec<Restriction>> {
            Ok(Vec::new())
        }
    }

    fn payload(label: Label, confidence: f64, at: DateTime<Utc>) -> MetadataPayload {
        MetadataPayload {
            file_path: "raw/doc.txt".into(),
            file_url: "https://acct.blob.core.windows.net/data/raw/doc.txt".into(),
            file_size: 1234,
            classification: label,
            confidence,
            detection_details: json!({ "entity-detection": { "categories": ["Person"] } }),
            analysis_timestamp: at,
        }
    }

    fn sink_with(actor: Arc<RecordingActor>) -> (Arc<MemoryStore>, MetadataSink) {
        let store = Arc::new(MemoryStore::new());
        let sink = MetadataSink::new(store.clone()).with_remediation(actor, Duration::from_secs(1));
        (store, sink)
    }

    #[test]
    fn remediation_condition_is_literal() {
        assert!(requires_remediation(Label::Pii, 0.0));
        assert!(requires_remediation(Label::Pii, 0.5));
        assert!(requires_remediation(Label::Confidential, 0.81));
        assert!(!requires_remediation(Label::Confidential, 0.8));
        assert!(!requires_remediation(Label::Unknown, 1.0));
        assert!(!requires_remediation(Label::None, 1.0));
    }

    #[tokio::test]
    async fn pii_is_stored_and_remediated_once() {
        let actor = Arc::new(RecordingActor::default());
        let (store, sink) = sink_with(actor.clone());

        let response = sink.handle(&payload(Label::Pii, 1.0, Utc::now())).await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "Metadata updated for raw/doc.txt");
        assert_eq!(store.count().unwrap(), 1);
        let calls = actor.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].classification, Label::Pii);
    }

    #[tokio::test]
    async fn low_confidence_confidential_is_not_remediated() {
        let actor = Arc::new(RecordingActor::default());
        let (_store, sink) = sink_with(actor.clone());

        let response = sink.handle(&payload(Label::Confidential, 0.8, Utc::now())).await;

        assert!(response.is_success());
        assert!(actor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn remediation_failure_does_not_fail_the_update() {
        let actor = Arc::new(RecordingActor {
            fail: true,
            ..Default::default()
        });
        let (store, sink) = sink_with(actor.clone());

        let response = sink.handle(&payload(Label::Pii, 1.0, Utc::now())).await;

        assert_eq!(response.status, 200);
        assert_eq!(actor.calls.lock().unwrap().len(), 1);
        assert!(store.load("raw/doc.txt").unwrap().is_some());
    }

    #[tokio::test]
    async fn redelivery_keeps_one_record_with_latest_timestamp() {
        let actor = Arc::new(RecordingActor::default());
        let (store, sink) = sink_with(actor);
        let first = Utc::now();
        let second = first + ChronoDuration::seconds(3);

        sink.handle(&payload(Label::None, 1.0, first)).await;
        sink.handle(&payload(Label::None, 1.0, second)).await;

        assert_eq!(store.count().unwrap(), 1);
        let stored = store.load("raw/doc.txt").unwrap().unwrap();
        assert_eq!(stored.analysis_timestamp, second);
    }

    #[tokio::test]
    async fn stale_update_skips_remediation() {
        let actor = Arc::new(RecordingActor::default());
        let (_store, sink) = sink_with(actor.clone());
        let now = Utc::now();

        sink.handle(&payload(Label::None, 1.0, now)).await;
        let response = sink
            .handle(&payload(Label::Pii, 1.0, now - ChronoDuration::seconds(10)))
            .await;

        assert_eq!(response.status, 200);
        assert!(actor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_a_500() {
        let sink = MetadataSink::new(Arc::new(BrokenStore));
        let response = sink.handle(&payload(Label::Pii, 1.0, Utc::now())).await;
        assert_eq!(response.status, 500);
        assert!(response.body.starts_with("Error processing request"));
    }

    #[tokio::test]
    async fn empty_or_invalid_body_is_a_400() {
        let sink = MetadataSink::new(Arc::new(MemoryStore::new()));
        assert_eq!(sink.handle_body(b"").await.status, 400);
        assert_eq!(sink.handle_body(b"{\"filePath\": 3}").await.status, 400);

        let body = serde_json::to_vec(&payload(Label::None, 1.0, Utc::now())).unwrap();
        assert_eq!(sink.handle_body(&body).await.status, 200);
    }
}
