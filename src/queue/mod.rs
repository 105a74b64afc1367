//! Queue between the ingestion adapter and the orchestrator
//!
//! Producers go through `QueueConnector`/`QueuePublisher` (connect, publish,
//! close). `ChannelQueue` is the in-process implementation; `QueueWorker`
//! drains it into the orchestrator with bounded redelivery.

mod channel;
mod worker;

pub use channel::{ChannelQueue, QueueReceiver};
pub use worker::{QueueWorker, WorkerStats};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,
    #[error("queue is full")]
    Full,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A message body plus how many times it has been delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub body: String,
    pub delivery_count: u32,
}

impl QueueMessage {
    pub fn first_delivery(body: String) -> Self {
        Self {
            body,
            delivery_count: 1,
        }
    }

    /// The same body, marked for its next delivery attempt.
    pub fn redelivered(self) -> Self {
        Self {
            delivery_count: self.delivery_count + 1,
            ..self
        }
    }
}

/// Opens publish connections to the queue.
#[async_trait]
pub trait QueueConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn QueuePublisher>, QueueError>;
}

/// One publish connection. Callers close it when done, success or not.
#[async_trait]
pub trait QueuePublisher: Send {
    async fn publish(&mut self, body: String) -> Result<(), QueueError>;

    async fn close(&mut self) -> Result<(), QueueError>;
}
