//! Entity-detection adapter
//!
//! Any detected PII entity makes the verdict `PII` with confidence 1.0; no
//! entities is `None` with confidence 1.0. Entity categories are kept as
//! evidence.

use super::{join_endpoint, send_json};
use crate::classify::traits::{AdapterUnavailable, ClassifierAdapter};
use crate::classify::types::{ClassificationHints, Label, PartialResult};
use crate::config::EntityDetectionSettings;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;

pub const SOURCE_ID: &str = "entity-detection";

const PII_PATH: &str = "text/analytics/v3.1/pii";

pub struct EntityDetectionClassifier {
    client: reqwest::Client,
    url: String,
    key: String,
    language: String,
    timeout: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct PiiResponse {
    documents: Vec<PiiDocument>,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct PiiDocument {
    #[serde(default)]
    entities: Vec<PiiEntity>,
}

#[derive(Debug, Deserialize)]
struct PiiEntity {
    category: String,
    #[serde(flatten)]
    rest: serde_json::Map<String, Value>,
}

impl EntityDetectionClassifier {
    pub fn new(client: reqwest::Client, settings: &EntityDetectionSettings) -> Self {
        Self {
            client,
            url: join_endpoint(&settings.endpoint, PII_PATH),
            key: settings.key.clone(),
            language: settings.language.clone(),
            timeout: settings.timeout_secs.map(Duration::from_secs),
        }
    }

    fn interpret(body: Value) -> Result<PartialResult, AdapterUnavailable> {
        let response: PiiResponse = serde_json::from_value(body)
            .map_err(|e| AdapterUnavailable::Malformed(e.to_string()))?;

        if response.documents.is_empty() && !response.errors.is_empty() {
            return Err(AdapterUnavailable::Malformed(format!(
                "service returned errors: {}",
                Value::Array(response.errors)
            )));
        }

        let entities = response
            .documents
            .into_iter()
            .next()
            .map(|doc| doc.entities)
            .unwrap_or_default();

        let categories: BTreeSet<&str> = entities.iter().map(|e| e.category.as_str()).collect();
        let label = if entities.is_empty() { Label::None } else { Label::Pii };

        let evidence = json!({
            "categories": categories,
            "entities": entities
                .iter()
                .map(|e| {
                    let mut entity = e.rest.clone();
                    entity.insert("category".into(), Value::String(e.category.clone()));
                    Value::Object(entity)
                })
                .collect::<Vec<_>>(),
        });

        Ok(PartialResult::new(SOURCE_ID, label, 1.0).with_evidence(evidence))
    }
}

#[async_trait]
impl ClassifierAdapter for EntityDetectionClassifier {
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
        let request = self
            .client
            .post(&self.url)
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .json(&json!({
                "documents": [{ "id": "1", "text": text, "language": self.language }]
            }));

        let body = send_json(request).await?;
        Self::interpret(body)
    }
}
