//! Hosted classification model adapter
//!
//! Posts `{"input_data": {"text": ...}}` and maps the scoring response
//! `{classification, confidence, message?, detection_details?}` straight to a
//! partial result. Scoring scripts commonly return their JSON as a string, so
//! a string body is decoded a second time.

use super::send_json;
use crate::classify::traits::{AdapterUnavailable, ClassifierAdapter};
use crate::classify::types::{ClassificationHints, Label, PartialResult};
use crate::config::ModelEndpointSettings;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub const SOURCE_ID: &str = "model-endpoint";

pub struct ModelEndpointClassifier {
    client: reqwest::Client,
    url: String,
    key: Option<String>,
    timeout: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    #[serde(default)]
    classification: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, alias = "details")]
    detection_details: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl ModelEndpointClassifier {
    pub fn new(client: reqwest::Client, settings: &ModelEndpointSettings) -> Self {
        Self {
            client,
            url: settings.url.clone(),
            key: settings.key.clone().filter(|k| !k.trim().is_empty()),
            timeout: settings.timeout_secs.map(Duration::from_secs),
        }
    }

    fn interpret(body: Value) -> Result<PartialResult, AdapterUnavailable> {
        let body = match body {
            Value::String(inner) => serde_json::from_str(&inner)
                .map_err(|e| AdapterUnavailable::Malformed(format!("string-encoded body: {}", e)))?,
            other => other,
        };
        let score: ScoreResponse = serde_json::from_value(body)
            .map_err(|e| AdapterUnavailable::Malformed(e.to_string()))?;

        if let Some(error) = score.error {
            return Err(AdapterUnavailable::Malformed(format!("model reported error: {}", error)));
        }

        let raw_label = score
            .classification
            .ok_or_else(|| AdapterUnavailable::Malformed("missing classification".into()))?;
        let confidence = score
            .confidence
            .ok_or_else(|| AdapterUnavailable::Malformed("missing confidence".into()))?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(AdapterUnavailable::Malformed(format!(
                "confidence {} outside [0, 1]",
                confidence
            )));
        }

        // A label outside the known set is a real answer we cannot interpret
        let label = raw_label.parse().unwrap_or(Label::Unknown);

        let mut evidence = json!({ "classification": raw_label });
        if let Some(message) = score.message {
            evidence["message"] = Value::String(message);
        }
        if let Some(details) = score.detection_details {
            evidence["details"] = details;
        }

        Ok(PartialResult::new(SOURCE_ID, label, confidence).with_evidence(evidence))
    }
}

#[async_trait]
impl ClassifierAdapter for ModelEndpointClassifier {
    fn id(&self) -> &str {
        SOURCE_ID
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn classify(
        &self,
        text: &str,
        _hints: &ClassificationHints,
    ) -> Result<PartialResult, AdapterUnavailable> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&json!({ "input_data": { "text": text } }));
        if let Some(key) = &self.key {
            request = request.bearer_auth(key);
        }

        let body = send_json(request).await?;
        Self::interpret(body)
    }
}
