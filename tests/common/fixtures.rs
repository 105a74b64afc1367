//! Pipeline assembly and input fixtures

use async_trait::async_trait;
use lakesentry::sink::{DispatchError, DispatchReceipt, LocalDispatcher};
use lakesentry::{
    ChangeKind, ClassificationOrchestrator, FileEvent, MemoryStore, MetadataDispatcher,
    MetadataPayload, MetadataStore, Pipeline, SentinelConfig, StorageNotification,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Dispatcher that counts hand-offs before writing through to the sink.
pub struct CountingDispatcher {
    inner: LocalDispatcher,
    pub dispatched: AtomicUsize,
}

#[async_trait]
impl MetadataDispatcher for CountingDispatcher {
    async fn dispatch(&self, payload: &MetadataPayload) -> Result<DispatchReceipt, DispatchError> {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        self.inner.dispatch(payload).await
    }
}

/// A pipeline over an in-memory store, plus a dispatch counter.
pub struct PipelineHarness {
    pub pipeline: Pipeline,
    pub store: Arc<MemoryStore>,
    pub dispatcher: Arc<CountingDispatcher>,
    pub orchestrator: Arc<ClassificationOrchestrator>,
    pub docs: TempDir,
}

impl PipelineHarness {
    pub fn new(config: SentinelConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::from_config(config, store.clone()).unwrap();

        // Same adapters and extraction as the assembled pipeline, with a
        // counting dispatcher in front of the sink
        let dispatcher = Arc::new(CountingDispatcher {
            inner: LocalDispatcher::new(Arc::clone(&pipeline.sink)),
            dispatched: AtomicUsize::new(0),
        });
        let orchestrator = Arc::new(
            ClassificationOrchestrator::new(
                Arc::new(lakesentry::BlobReader::default()),
                pipeline.orchestrator.registry().clone(),
                dispatcher.clone(),
            )
            .with_default_timeout(pipeline.config.classifiers.default_timeout())
            .with_stage_timeouts(
                pipeline.config.extraction_timeout(),
                pipeline.config.dispatch_timeout(),
            ),
        );

        Self {
            pipeline,
            store,
            dispatcher,
            orchestrator,
            docs: TempDir::new().unwrap(),
        }
    }

    pub fn dispatched(&self) -> usize {
        self.dispatcher.dispatched.load(Ordering::SeqCst)
    }

    /// File event for a document written into the harness's temp dir.
    pub fn event(&self, file_path: &str, content: &str) -> FileEvent {
        let locator = write_document(self.docs.path(), file_path, content);
        FileEvent::new(file_path, locator, content.len() as u64, ChangeKind::Created)
    }

    pub fn stored_count(&self) -> usize {
        self.store.count().unwrap()
    }
}

/// Write `content` under `root` and return its locator.
pub fn write_document(root: &Path, file_path: &str, content: &str) -> String {
    let path = root.join(file_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

/// Storage notification for the blob at `url`.
pub fn notification(event_type: &str, url: &str) -> StorageNotification {
    serde_json::from_value(serde_json::json!({
        "eventType": event_type,
        "subject": "/blobServices/default/containers/data/blobs/raw/doc.txt",
        "data": {
            "url": url,
            "contentLength": 64,
            "eTag": "0x8D9",
            "lastModified": "2024-01-01T00:00:00Z"
        }
    }))
    .unwrap()
}
