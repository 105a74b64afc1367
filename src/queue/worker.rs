//! Queue worker: feeds dequeued batches to the orchestrator
//!
//! Delivery is at-least-once. Retryable failures go back on the queue until
//! `max_deliveries` is reached, then the message is dead-lettered.

use super::channel::QueueReceiver;
use super::QueueMessage;
use crate::classify::ClassificationOrchestrator;
use std::sync::Arc;

/// Running totals of what the worker did with its messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    pub dropped: usize,
}

impl WorkerStats {
    fn absorb(&mut self, other: WorkerStats) {
        self.processed += other.processed;
        self.retried += other.retried;
        self.dead_lettered += other.dead_lettered;
        self.dropped += other.dropped;
    }
}

pub struct QueueWorker {
    orchestrator: Arc<ClassificationOrchestrator>,
    batch_size: usize,
    max_deliveries: u32,
}

impl QueueWorker {
    pub fn new(orchestrator: Arc<ClassificationOrchestrator>, batch_size: usize, max_deliveries: u32) -> Self {
        Self {
            orchestrator,
            batch_size: batch_size.max(1),
            max_deliveries: max_deliveries.max(1),
        }
    }

    /// Consume batches until the queue is closed and drained.
    pub async fn run(&self, mut receiver: QueueReceiver) -> WorkerStats {
        let mut stats = WorkerStats::default();
        loop {
            let batch = receiver.recv_batch(self.batch_size).await;
            if batch.is_empty() {
                break;
            }
            stats.absorb(self.handle_batch(batch, &receiver).await);
        }
        tracing::info!(?stats, "queue worker stopped");
        stats
    }

    /// Process one batch and settle every message in it.
    pub async fn handle_batch(&self, batch: Vec<QueueMessage>, receiver: &QueueReceiver) -> WorkerStats {
        let bodies = batch.iter().map(|m| m.body.clone()).collect();
        let report = self.orchestrator.process_batch(bodies).await;
        tracing::debug!(
            size = batch.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "batch processed"
        );

        let mut stats = WorkerStats::default();
        for (message, outcome) in batch.into_iter().zip(report.outcomes) {
            let err = match outcome {
                Ok(_) => {
                    stats.processed += 1;
                    continue;
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                tracing::warn!(error = %err, "dropping message that cannot succeed on redelivery");
                stats.dropped += 1;
                continue;
            }

            if message.delivery_count >= self.max_deliveries {
                tracing::error!(
                    deliveries = message.delivery_count,
                    error = %err,
                    body = %message.body,
                    "message dead-lettered"
                );
                stats.dead_lettered += 1;
                continue;
            }

            let deliveries = message.delivery_count;
            match receiver.requeue(message.redelivered()) {
                Ok(()) => {
                    tracing::info!(deliveries, error = %err, "message requeued");
                    stats.retried += 1;
                }
                Err(e) => {
                    tracing::error!(deliveries, error = %err, requeue_error = %e, "message dead-lettered");
                    stats.dead_lettered += 1;
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ChangeKind, ClassifierRegistry, FileEvent};
    use crate::extract::{ExtractionError, ExtractionPort};
    use crate::queue::{ChannelQueue, QueueConnector};
    use crate::sink::{LocalDispatcher, MetadataSink};
    use crate::storage::{MemoryStore, MetadataStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails extraction a fixed number of times before succeeding.
    struct Flaky {
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl ExtractionPort for Flaky {
        async fn extract(&self, locator: &str) -> Result<String, ExtractionError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(ExtractionError::Transport {
                    locator: locator.to_string(),
                    message: "connection reset".into(),
                });
            }
            Ok("plain text".into())
        }
    }

    fn worker(failures: usize, max_deliveries: u32) -> (QueueWorker, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MetadataSink::new(store.clone()));
        let orchestrator = ClassificationOrchestrator::new(
            Arc::new(Flaky {
                failures_left: AtomicUsize::new(failures),
            }),
            ClassifierRegistry::new(),
            Arc::new(LocalDispatcher::new(sink)),
        );
        (QueueWorker::new(Arc::new(orchestrator), 4, max_deliveries), store)
    }

    fn event_body() -> String {
        let event = FileEvent::new("raw/a.txt", "file:///tmp/a.txt", 10, ChangeKind::Created);
        serde_json::to_string(&event).unwrap()
    }

    #[tokio::test]
    async fn transient_failure_is_retried_until_it_succeeds() {
        let (worker, store) = worker(2, 3);
        let (queue, receiver) = ChannelQueue::bounded(8);
        let mut publisher = queue.connect().await.unwrap();
        publisher.publish(event_body()).await.unwrap();
        publisher.close().await.unwrap();

        let handle = tokio::spawn(async move { worker.run(receiver).await });
        // Give the worker time to requeue, then close the producer side
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        drop(queue);
        let stats = handle.await.unwrap();

        assert_eq!(stats.retried, 2);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.dead_lettered, 0);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn exhausted_deliveries_are_dead_lettered() {
        let (worker, store) = worker(10, 2);
        let (queue, receiver) = ChannelQueue::bounded(8);
        let mut publisher = queue.connect().await.unwrap();
        publisher.publish(event_body()).await.unwrap();

        let handle = tokio::spawn(async move { worker.run(receiver).await });
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        drop(publisher);
        drop(queue);
        let stats = handle.await.unwrap();

        assert_eq!(stats.retried, 1);
        assert_eq!(stats.dead_lettered, 1);
        assert_eq!(stats.processed, 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn malformed_messages_are_dropped_not_retried() {
        let (worker, _store) = worker(0, 3);
        let (queue, receiver) = ChannelQueue::bounded(8);
        let mut publisher = queue.connect().await.unwrap();
        publisher.publish("not a file event".into()).await.unwrap();
        publisher.publish(event_body()).await.unwrap();
        drop(publisher);
        drop(queue);

        let stats = worker.run(receiver).await;
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.retried, 0);
    }
}
