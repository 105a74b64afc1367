//! Wiring of the pipeline components from configuration
//!
//! Everything is built once at startup from a `SentinelConfig` and shared
//! through `Arc`s; no component reads the environment afterwards.

use crate::classify::adapters::build_registry;
use crate::classify::ClassificationOrchestrator;
use crate::config::SentinelConfig;
use crate::extract::BlobReader;
use crate::ingest::IngestionAdapter;
use crate::queue::{ChannelQueue, QueueReceiver, QueueWorker};
use crate::server::AppState;
use crate::sink::{
    AccessRestrictor, HttpDispatcher, HttpRemediationActor, LedgerAccessPolicy, LocalDispatcher,
    MetadataDispatcher, MetadataSink, RemediationActor,
};
use crate::storage::MetadataStore;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// The assembled pipeline, ready to serve or to run one-shot classifications.
pub struct Pipeline {
    pub config: Arc<SentinelConfig>,
    pub store: Arc<dyn MetadataStore>,
    pub sink: Arc<MetadataSink>,
    pub remediation: Arc<dyn RemediationActor>,
    pub orchestrator: Arc<ClassificationOrchestrator>,
}

impl Pipeline {
    pub fn from_config(
        config: SentinelConfig,
        store: Arc<dyn MetadataStore>,
    ) -> Result<Self, PipelineError> {
        let config = Arc::new(config);
        // Per-request bounds come from the orchestrator and adapter timeouts
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()?;
        let reader = Arc::new(BlobReader::new(client.clone()));

        let remediation: Arc<dyn RemediationActor> = match &config.remediation.url {
            Some(url) => Arc::new(HttpRemediationActor::new(client.clone(), url)),
            None => Arc::new(AccessRestrictor::new(Arc::new(LedgerAccessPolicy::new(
                Arc::clone(&store),
            )))),
        };
        let sink = Arc::new(
            MetadataSink::new(Arc::clone(&store))
                .with_remediation(Arc::clone(&remediation), config.remediation.timeout()),
        );

        let dispatcher: Arc<dyn MetadataDispatcher> = match &config.metadata.dispatch_url {
            Some(url) => Arc::new(HttpDispatcher::new(client.clone(), url)),
            None => Arc::new(LocalDispatcher::new(Arc::clone(&sink))),
        };

        let registry = build_registry(&config.classifiers, client, reader.clone());
        let orchestrator = Arc::new(
            ClassificationOrchestrator::new(reader, registry, dispatcher)
                .with_default_timeout(config.classifiers.default_timeout())
                .with_stage_timeouts(config.extraction_timeout(), config.dispatch_timeout()),
        );

        Ok(Self {
            config,
            store,
            sink,
            remediation,
            orchestrator,
        })
    }

    /// Create the in-process queue with its ingestion front and worker back.
    pub fn queue(&self) -> (IngestionAdapter, QueueWorker, QueueReceiver) {
        let (queue, receiver) = ChannelQueue::bounded(self.config.queue.capacity);
        let ingestion = IngestionAdapter::new(self.config.root_container.clone(), Arc::new(queue));
        let worker = QueueWorker::new(
            Arc::clone(&self.orchestrator),
            self.config.queue.batch_size,
            self.config.queue.max_deliveries,
        );
        (ingestion, worker, receiver)
    }

    /// Handles for the HTTP surface.
    pub fn app_state(&self, ingestion: IngestionAdapter) -> AppState {
        AppState {
            ingestion: Arc::new(ingestion),
            sink: Arc::clone(&self.sink),
            remediation: Arc::clone(&self.remediation),
        }
    }
}
