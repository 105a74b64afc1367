//! In-process bounded queue on tokio mpsc

use super::{QueueConnector, QueueError, QueueMessage, QueuePublisher};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Producer side of the in-process queue.
///
/// Cheap to clone; every clone publishes into the same channel.
#[derive(Clone)]
pub struct ChannelQueue {
    tx: mpsc::Sender<QueueMessage>,
    published: Arc<AtomicU64>,
}

/// Consumer side of the in-process queue.
pub struct QueueReceiver {
    rx: mpsc::Receiver<QueueMessage>,
    // Weak so the channel still closes once every producer is gone
    requeue: mpsc::WeakSender<QueueMessage>,
}

impl ChannelQueue {
    /// Create a queue holding at most `capacity` pending messages.
    pub fn bounded(capacity: usize) -> (Self, QueueReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let requeue = tx.downgrade();
        (
            Self {
                tx,
                published: Arc::new(AtomicU64::new(0)),
            },
            QueueReceiver { rx, requeue },
        )
    }

    /// Messages published through this queue since creation.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl QueueConnector for ChannelQueue {
    async fn connect(&self) -> Result<Box<dyn QueuePublisher>, QueueError> {
        if self.tx.is_closed() {
            return Err(QueueError::Closed);
        }
        Ok(Box::new(ChannelPublisher {
            tx: Some(self.tx.clone()),
            published: Arc::clone(&self.published),
        }))
    }
}

struct ChannelPublisher {
    tx: Option<mpsc::Sender<QueueMessage>>,
    published: Arc<AtomicU64>,
}

#[async_trait]
impl QueuePublisher for ChannelPublisher {
    async fn publish(&mut self, body: String) -> Result<(), QueueError> {
        let tx = self.tx.as_ref().ok_or(QueueError::Closed)?;
        tx.send(QueueMessage::first_delivery(body))
            .await
            .map_err(|_| QueueError::Closed)?;
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), QueueError> {
        self.tx = None;
        Ok(())
    }
}

impl QueueReceiver {
    /// Wait for at least one message, then take up to `max` without waiting.
    ///
    /// Returns an empty batch once the queue is closed and drained.
    pub async fn recv_batch(&mut self, max: usize) -> Vec<QueueMessage> {
        let mut batch = Vec::new();
        let Some(first) = self.rx.recv().await else {
            return batch;
        };
        batch.push(first);
        while batch.len() < max.max(1) {
            match self.rx.try_recv() {
                Ok(message) => batch.push(message),
                Err(_) => break,
            }
        }
        batch
    }

    /// Put a message back for another delivery attempt.
    pub fn requeue(&self, message: QueueMessage) -> Result<(), QueueError> {
        let tx = self.requeue.upgrade().ok_or(QueueError::Closed)?;
        tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}
