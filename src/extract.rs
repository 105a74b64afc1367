//! Extraction port: fetches file content for classification
//!
//! Text extraction itself is a collaborator behind `ExtractionPort`. The
//! bundled `BlobReader` reads `http(s)://` locators with a GET and anything
//! else from the local filesystem, decoding bytes as UTF-8 (lossily). It also
//! serves prompt templates through `TemplateStore`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from content retrieval.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("content not found: {0}")]
    NotFound(String),
    #[error("transport error for {locator}: {message}")]
    Transport { locator: String, message: String },
    #[error("IO error for {locator}: {source}")]
    Io {
        locator: String,
        #[source]
        source: std::io::Error,
    },
    #[error("extraction of {locator} timed out after {limit:?}")]
    TimedOut { locator: String, limit: Duration },
}

/// Given a file locator, return its raw text content.
#[async_trait]
pub trait ExtractionPort: Send + Sync {
    async fn extract(&self, locator: &str) -> Result<String, ExtractionError>;
}

/// Source of prompt templates for the generative classifier.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn fetch_template(&self, locator: &str) -> Result<String, ExtractionError>;
}

/// Reads blobs over HTTP or from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct BlobReader {
    client: Client,
}

impl BlobReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn read(&self, locator: &str) -> Result<Vec<u8>, ExtractionError> {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            self.read_http(locator).await
        } else {
            let path = local_path(locator);
            tokio::fs::read(&path).await.map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    ExtractionError::NotFound(locator.to_string())
                } else {
                    ExtractionError::Io {
                        locator: locator.to_string(),
                        source,
                    }
                }
            })
        }
    }

    async fn read_http(&self, locator: &str) -> Result<Vec<u8>, ExtractionError> {
        let transport = |message: String| ExtractionError::Transport {
            locator: locator.to_string(),
            message,
        };

        let response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ExtractionError::NotFound(locator.to_string())),
            status if !status.is_success() => Err(transport(format!("status {}", status))),
            _ => response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| transport(e.to_string())),
        }
    }
}

fn local_path(locator: &str) -> PathBuf {
    PathBuf::from(locator.strip_prefix("file://").unwrap_or(locator))
}

#[async_trait]
impl ExtractionPort for BlobReader {
    async fn extract(&self, locator: &str) -> Result<String, ExtractionError> {
        let bytes = self.read(locator).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[async_trait]
impl TemplateStore for BlobReader {
    async fn fetch_template(&self, locator: &str) -> Result<String, ExtractionError> {
        self.extract(locator).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reads_local_files_with_and_without_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        std::fs::write(&file, "name: Jane Doe").unwrap();

        let reader = BlobReader::default();
        let plain = reader.extract(file.to_str().unwrap()).await.unwrap();
        let with_scheme = reader
            .extract(&format!("file://{}", file.display()))
            .await
            .unwrap();

        assert_eq!(plain, "name: Jane Doe");
        assert_eq!(with_scheme, plain);
    }

    #[tokio::test]
    async fn missing_local_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        let err = BlobReader::default()
            .extract(missing.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::NotFound(_)));
    }

    #[tokio::test]
    async fn invalid_utf8_is_decoded_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bin.dat");
        std::fs::write(&file, [b'o', b'k', 0xff]).unwrap();

        let text = BlobReader::default().extract(file.to_str().unwrap()).await.unwrap();
        assert!(text.starts_with("ok"));
    }

    #[tokio::test]
    async fn reads_http_blobs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/raw/doc.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("account 1234"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/raw/broken.txt"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let reader = BlobReader::default();
        let text = reader
            .extract(&format!("{}/data/raw/doc.txt", server.uri()))
            .await
            .unwrap();
        assert_eq!(text, "account 1234");

        let missing = reader
            .extract(&format!("{}/data/raw/missing.txt", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(missing, ExtractionError::NotFound(_)));

        let broken = reader
            .fetch_template(&format!("{}/data/raw/broken.txt", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(broken, ExtractionError::Transport { .. }));
    }
}
