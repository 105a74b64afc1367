//! Classification orchestrator
//!
//! One run per dequeued `FileEvent`:
//! 1. Extract content through the extraction port (failure aborts the run)
//! 2. Fan out to every registered adapter, each bounded by its own timeout
//! 3. Merge the partial results that came back
//! 4. Dispatch the merged result to the metadata sink exactly once
//!
//! Extraction and dispatch have stage timeouts of their own; exceeding either
//! fails the run with a retryable error.
//!
//! Runs share nothing but the read-only registry and collaborators, so any
//! number of them may execute concurrently.

use super::merger::merge;
use super::traits::{AdapterUnavailable, ClassifierAdapter, ClassifierRegistry};
use super::types::{ClassificationHints, ClassificationResult, FileEvent, PartialResult};
use crate::extract::{ExtractionError, ExtractionPort};
use crate::sink::{DispatchError, MetadataDispatcher, MetadataPayload};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Characters of extracted text echoed at debug level.
const TEXT_SAMPLE_CHARS: usize = 100;

/// Run-level failures surfaced to the queue layer.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("malformed queue message: {0}")]
    MalformedMessage(String),
    #[error("run aborted: {0}")]
    Aborted(String),
}

impl OrchestratorError {
    /// Whether redelivering the same message could succeed.
    ///
    /// A malformed message would fail identically on every redelivery.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::MalformedMessage(_))
    }
}

/// What one adapter produced during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOutcome {
    pub adapter_id: String,
    pub result: Result<PartialResult, AdapterUnavailable>,
}

/// Per-message outcomes of a batch, in input order.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<Result<ClassificationResult, OrchestratorError>>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

pub struct ClassificationOrchestrator {
    extractor: Arc<dyn ExtractionPort>,
    registry: ClassifierRegistry,
    dispatcher: Arc<dyn MetadataDispatcher>,
    default_timeout: Duration,
    extraction_timeout: Duration,
    dispatch_timeout: Duration,
}

impl ClassificationOrchestrator {
    pub fn new(
        extractor: Arc<dyn ExtractionPort>,
        registry: ClassifierRegistry,
        dispatcher: Arc<dyn MetadataDispatcher>,
    ) -> Self {
        Self {
            extractor,
            registry,
            dispatcher,
            default_timeout: Duration::from_secs(30),
            extraction_timeout: Duration::from_secs(30),
            dispatch_timeout: Duration::from_secs(30),
        }
    }

    /// Timeout applied to adapters that do not declare their own.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Upper bounds for content extraction and result dispatch.
    pub fn with_stage_timeouts(mut self, extraction: Duration, dispatch: Duration) -> Self {
        self.extraction_timeout = extraction;
        self.dispatch_timeout = dispatch;
        self
    }

    pub fn registry(&self) -> &ClassifierRegistry {
        &self.registry
    }

    /// Classify one file event and dispatch the result.
    pub async fn process(&self, event: &FileEvent) -> Result<ClassificationResult, OrchestratorError> {
        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, file_path = %event.file_path, "classification run started");

        let extraction = self.extractor.extract(&event.file_locator);
        let text = match tokio::time::timeout(self.extraction_timeout, extraction).await {
            Ok(extracted) => extracted,
            Err(_) => Err(ExtractionError::TimedOut {
                locator: event.file_locator.clone(),
                limit: self.extraction_timeout,
            }),
        }
        .map_err(|e| {
            tracing::warn!(%run_id, file_path = %event.file_path, error = %e, "extraction failed");
            e
        })?;
        tracing::debug!(
            %run_id,
            chars = text.chars().count(),
            sample = %text.chars().take(TEXT_SAMPLE_CHARS).collect::<String>(),
            "content extracted"
        );

        let outcomes = self.fan_out(Arc::from(text), &event.hints()).await;
        let partials: Vec<PartialResult> = outcomes
            .into_iter()
            .filter_map(|outcome| match outcome.result {
                Ok(partial) => Some(partial),
                Err(e) => {
                    tracing::warn!(
                        %run_id,
                        adapter = %outcome.adapter_id,
                        error = %e,
                        "classifier adapter unavailable"
                    );
                    None
                }
            })
            .collect();

        let result = merge(&partials).finalize(event, Utc::now());
        tracing::info!(
            %run_id,
            file_path = %result.file_path,
            label = %result.label,
            confidence = result.confidence,
            contributors = partials.len(),
            "classification merged"
        );

        let payload = MetadataPayload::from(&result);
        let dispatch = self.dispatcher.dispatch(&payload);
        let receipt = match tokio::time::timeout(self.dispatch_timeout, dispatch).await {
            Ok(dispatched) => dispatched,
            Err(_) => Err(DispatchError::TimedOut(self.dispatch_timeout)),
        }
        .map_err(|e| {
            tracing::warn!(%run_id, file_path = %result.file_path, error = %e, "dispatch failed");
            e
        })?;
        tracing::info!(%run_id, file_path = %result.file_path, status = receipt.status, "result dispatched");

        Ok(result)
    }

    /// Decode a queue message body and process it.
    pub async fn process_message(&self, body: &str) -> Result<ClassificationResult, OrchestratorError> {
        let event: FileEvent = serde_json::from_str(body)
            .map_err(|e| OrchestratorError::MalformedMessage(e.to_string()))?;
        self.process(&event).await
    }

    /// Process a batch of queue messages concurrently.
    ///
    /// A failing message never blocks its siblings; the report holds one
    /// outcome per message in input order.
    pub async fn process_batch(self: &Arc<Self>, messages: Vec<String>) -> BatchReport {
        let total = messages.len();
        let mut join_set = JoinSet::new();
        for (index, body) in messages.into_iter().enumerate() {
            let orchestrator = Arc::clone(self);
            join_set.spawn(async move { (index, orchestrator.process_message(&body).await) });
        }

        let mut slots: Vec<Option<Result<ClassificationResult, OrchestratorError>>> =
            (0..total).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => tracing::error!(error = %e, "classification run task failed"),
            }
        }

        let outcomes = slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(OrchestratorError::Aborted("run task panicked".into())))
            })
            .collect();
        BatchReport { outcomes }
    }

    /// Invoke every adapter concurrently and wait for all of them.
    ///
    /// Outcomes come back in registry order. An adapter that exceeds its
    /// timeout is cancelled; one whose task panics is reported as crashed.
    async fn fan_out(&self, text: Arc<str>, hints: &ClassificationHints) -> Vec<AdapterOutcome> {
        let adapters = self.registry.adapters();
        let mut join_set = JoinSet::new();

        for (index, adapter) in adapters.iter().enumerate() {
            let adapter: Arc<dyn ClassifierAdapter> = Arc::clone(adapter);
            let text = Arc::clone(&text);
            let hints = hints.clone();
            let limit = adapter.timeout().unwrap_or(self.default_timeout);

            join_set.spawn(async move {
                let result = match tokio::time::timeout(limit, adapter.classify(&text, &hints)).await {
                    Ok(result) => result,
                    Err(_) => Err(AdapterUnavailable::TimedOut(limit)),
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<Result<PartialResult, AdapterUnavailable>>> =
            adapters.iter().map(|_| None).collect();
        let mut panics = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => panics.push(e.to_string()),
            }
        }

        // Slots that never reported back belong to tasks that panicked
        let mut panics = panics.into_iter();
        adapters
            .iter()
            .zip(slots)
            .map(|(adapter, slot)| AdapterOutcome {
                adapter_id: adapter.id().to_string(),
                result: slot.unwrap_or_else(|| {
                    Err(AdapterUnavailable::Crashed(
                        panics.next().unwrap_or_else(|| "task panicked".to_string()),
                    ))
                }),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::types::{ChangeKind, Label};
    use crate::sink::DispatchReceipt;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StaticText(Option<&'static str>);

    #[async_trait]
    impl ExtractionPort for StaticText {
        async fn extract(&self, locator: &str) -> Result<String, ExtractionError> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| ExtractionError::NotFound(locator.to_string()))
        }
    }

    enum Behaviour {
        Answer(Label, f64),
        Fail,
        Hang,
        Panic,
    }

    struct Scripted {
        id: &'static str,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(id: &'static str, behaviour: Behaviour) -> Self {
            Self {
                id,
                behaviour,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ClassifierAdapter for Scripted {
        fn id(&self) -> &str {
            self.id
        }

        fn timeout(&self) -> Option<Duration> {
            match self.behaviour {
                Behaviour::Hang => Some(Duration::from_millis(50)),
                _ => None,
            }
        }

        async fn classify(
            &self,
            _text: &str,
            _hints: &ClassificationHints,
        ) -> Result<PartialResult, AdapterUnavailable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Answer(label, confidence) => {
                    Ok(PartialResult::new(self.id, label, confidence).with_evidence(json!({ "by": self.id })))
                }
                Behaviour::Fail => Err(AdapterUnavailable::Transport("connection refused".into())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(PartialResult::new(self.id, Label::Pii, 1.0))
                }
                Behaviour::Panic => panic!("adapter bug"),
            }
        }
    }

    struct StalledText;

    #[async_trait]
    impl ExtractionPort for StalledText {
        async fn extract(&self, _locator: &str) -> Result<String, ExtractionError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("late".into())
        }
    }

    #[derive(Default)]
    struct RecordingDispatcher {
        payloads: Mutex<Vec<MetadataPayload>>,
        reject: bool,
        stall: bool,
    }

    #[async_trait]
    impl MetadataDispatcher for RecordingDispatcher {
        async fn dispatch(&self, payload: &MetadataPayload) -> Result<DispatchReceipt, DispatchError> {
            self.payloads.lock().unwrap().push(payload.clone());
            if self.stall {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.reject {
                Err(DispatchError::Rejected {
                    status: 500,
                    body: "Error processing request: down".into(),
                })
            } else {
                Ok(DispatchReceipt {
                    status: 200,
                    body: format!("Metadata updated for {}", payload.file_path),
                })
            }
        }
    }

    fn event() -> FileEvent {
        FileEvent::new(
            "raw/doc.txt",
            "https://acct.blob.core.windows.net/data/raw/doc.txt",
            42,
            ChangeKind::Created,
        )
    }

    fn orchestrator(
        text: Option<&'static str>,
        registry: ClassifierRegistry,
        dispatcher: Arc<RecordingDispatcher>,
    ) -> ClassificationOrchestrator {
        ClassificationOrchestrator::new(Arc::new(StaticText(text)), registry, dispatcher)
            .with_default_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn merges_successful_adapters_and_dispatches_once() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let registry = ClassifierRegistry::new()
            .with(Scripted::new("a", Behaviour::Answer(Label::None, 1.0)))
            .with(Scripted::new("b", Behaviour::Answer(Label::Pii, 0.6)));

        let result = orchestrator(Some("hello"), registry, dispatcher.clone())
            .process(&event())
            .await
            .unwrap();

        assert_eq!(result.label, Label::Pii);
        assert_eq!(result.confidence, 0.6);
        assert_eq!(result.evidence_by_source.len(), 2);
        let payloads = dispatcher.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].classification, Label::Pii);
        assert_eq!(payloads[0].file_size, 42);
    }

    #[tokio::test]
    async fn failing_hanging_and_panicking_adapters_are_excluded() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let registry = ClassifierRegistry::new()
            .with(Scripted::new("fails", Behaviour::Fail))
            .with(Scripted::new("hangs", Behaviour::Hang))
            .with(Scripted::new("panics", Behaviour::Panic))
            .with(Scripted::new("works", Behaviour::Answer(Label::Confidential, 0.85)));

        let result = orchestrator(Some("hello"), registry, dispatcher.clone())
            .process(&event())
            .await
            .unwrap();

        assert_eq!(result.label, Label::Confidential);
        assert_eq!(result.confidence, 0.85);
        assert_eq!(
            result.evidence_by_source.keys().collect::<Vec<_>>(),
            vec!["works"]
        );
        assert_eq!(dispatcher.payloads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fan_out_reports_each_failure_kind_in_registry_order() {
        let registry = ClassifierRegistry::new()
            .with(Scripted::new("hangs", Behaviour::Hang))
            .with(Scripted::new("panics", Behaviour::Panic))
            .with(Scripted::new("works", Behaviour::Answer(Label::None, 1.0)));
        let orch = orchestrator(Some("x"), registry, Arc::new(RecordingDispatcher::default()));

        let outcomes = orch.fan_out(Arc::from("x"), &event().hints()).await;

        let ids: Vec<_> = outcomes.iter().map(|o| o.adapter_id.as_str()).collect();
        assert_eq!(ids, vec!["hangs", "panics", "works"]);
        assert!(matches!(outcomes[0].result, Err(AdapterUnavailable::TimedOut(_))));
        assert!(matches!(outcomes[1].result, Err(AdapterUnavailable::Crashed(_))));
        assert!(outcomes[2].result.is_ok());
    }

    #[tokio::test]
    async fn no_adapters_yields_unknown() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let result = orchestrator(Some("hello"), ClassifierRegistry::new(), dispatcher.clone())
            .process(&event())
            .await
            .unwrap();

        assert_eq!(result.label, Label::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert!(result.evidence_by_source.is_empty());
        assert_eq!(dispatcher.payloads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn extraction_failure_aborts_without_classifying_or_dispatching() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let adapter = Arc::new(Scripted::new("a", Behaviour::Answer(Label::Pii, 1.0)));
        let mut registry = ClassifierRegistry::new();
        registry.register_shared(adapter.clone());

        let err = orchestrator(None, registry, dispatcher.clone())
            .process(&event())
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Extraction(ExtractionError::NotFound(_))));
        assert!(err.is_retryable());
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
        assert!(dispatcher.payloads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dispatch_failure_is_retryable() {
        let dispatcher = Arc::new(RecordingDispatcher {
            reject: true,
            ..Default::default()
        });
        let registry = ClassifierRegistry::new().with(Scripted::new("a", Behaviour::Answer(Label::None, 1.0)));

        let err = orchestrator(Some("x"), registry, dispatcher)
            .process(&event())
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Dispatch(DispatchError::Rejected { status: 500, .. })));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unanswered_dispatch_times_out_as_retryable_failure() {
        let dispatcher = Arc::new(RecordingDispatcher {
            stall: true,
            ..Default::default()
        });
        let registry = ClassifierRegistry::new().with(Scripted::new("a", Behaviour::Answer(Label::Pii, 1.0)));
        let orch = orchestrator(Some("x"), registry, dispatcher.clone())
            .with_stage_timeouts(Duration::from_secs(5), Duration::from_millis(50));

        let err = tokio::time::timeout(Duration::from_secs(5), orch.process(&event()))
            .await
            .expect("run finishes once dispatch times out")
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Dispatch(DispatchError::TimedOut(_))));
        assert!(err.is_retryable());
        assert_eq!(dispatcher.payloads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stalled_extraction_times_out_before_classifying() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let adapter = Arc::new(Scripted::new("a", Behaviour::Answer(Label::Pii, 1.0)));
        let mut registry = ClassifierRegistry::new();
        registry.register_shared(adapter.clone());
        let orch = ClassificationOrchestrator::new(Arc::new(StalledText), registry, dispatcher.clone())
            .with_stage_timeouts(Duration::from_millis(50), Duration::from_secs(5));

        let err = tokio::time::timeout(Duration::from_secs(5), orch.process(&event()))
            .await
            .expect("run finishes once extraction times out")
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Extraction(ExtractionError::TimedOut { .. })));
        assert!(err.is_retryable());
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
        assert!(dispatcher.payloads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_isolates_malformed_messages() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let registry = ClassifierRegistry::new().with(Scripted::new("a", Behaviour::Answer(Label::None, 1.0)));
        let orch = Arc::new(orchestrator(Some("x"), registry, dispatcher.clone()));

        let good = serde_json::to_string(&event()).unwrap();
        let report = orch
            .process_batch(vec![good.clone(), "{not json".into(), good])
            .await;

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        let err = report.outcomes[1].as_ref().unwrap_err();
        assert!(matches!(err, OrchestratorError::MalformedMessage(_)));
        assert!(!err.is_retryable());
        assert_eq!(dispatcher.payloads.lock().unwrap().len(), 2);
    }
}
