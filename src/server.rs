//! HTTP surface for the pipeline
//!
//! - `POST /notifications`: storage-change notification, forwarded to the
//!   ingestion adapter
//! - `POST /metadata`: classification payload, handled by the metadata sink
//! - `POST /remediation`: remediation request, handled by the remediation actor

use crate::ingest::{IngestError, IngestOutcome, IngestionAdapter};
use crate::sink::{MetadataSink, RemediationActor, RemediationRequest};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared handles for the request handlers.
#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<IngestionAdapter>,
    pub sink: Arc<MetadataSink>,
    pub remediation: Arc<dyn RemediationActor>,
}

type Reply = (StatusCode, String);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/notifications", post(notifications))
        .route("/metadata", post(metadata))
        .route("/remediation", post(remediation))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "http surface listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn notifications(State(state): State<AppState>, body: Bytes) -> Reply {
    match state.ingestion.handle_json(&body).await {
        Ok(IngestOutcome::Published(event)) => {
            (StatusCode::ACCEPTED, format!("Queued {}", event.file_path))
        }
        Ok(IngestOutcome::Skipped { event_type }) => {
            (StatusCode::OK, format!("Skipping event of type: {}", event_type))
        }
        Ok(IngestOutcome::Malformed { url }) => (
            StatusCode::OK,
            format!("Could not parse file path from URL: {}", url),
        ),
        Err(e @ IngestError::Decode(_)) => (StatusCode::BAD_REQUEST, e.to_string()),
        Err(e @ IngestError::Publish(_)) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn metadata(State(state): State<AppState>, body: Bytes) -> Reply {
    let response = state.sink.handle_body(&body).await;
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, response.body)
}

async fn remediation(State(state): State<AppState>, body: Bytes) -> Reply {
    let Ok(request) = serde_json::from_slice::<RemediationRequest>(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            "Please pass filePath and classification in the request body.".to_string(),
        );
    };

    match state.remediation.remediate(&request).await {
        Ok(status) => (StatusCode::OK, status),
        Err(e) => {
            tracing::error!(file_path = %request.file_path, error = %e, "remediation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error during remediation for {}: {}", request.file_path, e),
            )
        }
    }
}
