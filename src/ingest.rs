//! Ingestion adapter: storage-change notifications to queued file events
//!
//! Only creations and updates are forwarded. The file path is derived from
//! the blob URL relative to the configured root container; a URL that does
//! not yield one is dropped as malformed. Publish failures propagate so the
//! notifying layer redelivers.

use crate::classify::{ChangeKind, FileEvent};
use crate::queue::{QueueConnector, QueueError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid notification: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to publish file event: {0}")]
    Publish(#[from] QueueError),
}

/// Storage-change notification as delivered by the storage event service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageNotification {
    pub event_type: String,
    #[serde(default)]
    pub subject: String,
    pub data: NotificationData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub url: String,
    #[serde(default)]
    pub content_length: u64,
    #[serde(default)]
    pub e_tag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// What happened to one notification.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Published(FileEvent),
    /// Not a creation or update
    Skipped { event_type: String },
    /// No file path derivable from the URL
    Malformed { url: String },
}

/// Path of the blob relative to `root_container`.
///
/// Everything after the first `/<root_container>/` segment; `None` when that
/// segment is absent or nothing follows it.
pub fn derive_file_path(url: &str, root_container: &str) -> Option<String> {
    let marker = format!("/{}/", root_container);
    let (_, rest) = url.split_once(&marker)?;
    let path = rest.split(['?', '#']).next().unwrap_or_default();
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

pub struct IngestionAdapter {
    root_container: String,
    connector: Arc<dyn QueueConnector>,
}

impl IngestionAdapter {
    pub fn new(root_container: impl Into<String>, connector: Arc<dyn QueueConnector>) -> Self {
        Self {
            root_container: root_container.into(),
            connector,
        }
    }

    /// Decode and handle a raw notification body.
    pub async fn handle_json(&self, body: &[u8]) -> Result<IngestOutcome, IngestError> {
        let notification: StorageNotification = serde_json::from_slice(body)?;
        self.handle(&notification).await
    }

    pub async fn handle(&self, notification: &StorageNotification) -> Result<IngestOutcome, IngestError> {
        let Some(change_kind) = ChangeKind::from_event_type(&notification.event_type) else {
            tracing::info!(event_type = %notification.event_type, "skipping event");
            return Ok(IngestOutcome::Skipped {
                event_type: notification.event_type.clone(),
            });
        };

        let url = &notification.data.url;
        let Some(file_path) = derive_file_path(url, &self.root_container) else {
            tracing::warn!(%url, root_container = %self.root_container, "could not derive file path from URL");
            return Ok(IngestOutcome::Malformed { url: url.clone() });
        };
        tracing::info!(event_type = %notification.event_type, %url, "processing storage event");

        let mut event = FileEvent::new(&file_path, url, notification.data.content_length, change_kind);
        if let Some(e_tag) = &notification.data.e_tag {
            event = event.with_etag(e_tag);
        }
        if let Some(last_modified) = &notification.data.last_modified {
            event = event.with_last_modified(last_modified);
        }

        let body = serde_json::to_string(&event).map_err(QueueError::from)?;
        let mut publisher = self.connector.connect().await?;
        let published = publisher.publish(body).await;
        // Close regardless of the publish outcome
        if let Err(e) = publisher.close().await {
            tracing::warn!(error = %e, "failed to close queue publisher");
        }
        published.map_err(|e| {
            tracing::error!(%file_path, error = %e, "failed to publish file event");
            e
        })?;

        tracing::info!(%file_path, "file event queued");
        Ok(IngestOutcome::Published(event))
    }
}
