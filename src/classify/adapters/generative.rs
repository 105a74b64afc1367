//! Generative-model adapter
//!
//! Fetches a prompt template, substitutes the extracted text, asks a chat
//! completion deployment for a verdict and pattern-matches the free-text
//! answer. The signal is keyword-derived, so each label carries a confidence
//! floor instead of a model score: `Classification: PII` → 0.9,
//! `Classification: Confidential` → 0.8. An explicit `Confidence: <n>` in the
//! answer can only raise the floor.

use super::{join_endpoint, send_json};
use crate::classify::traits::{AdapterUnavailable, ClassifierAdapter};
use crate::classify::types::{ClassificationHints, Label, PartialResult};
use crate::config::GenerativeSettings;
use crate::extract::TemplateStore;
use async_trait::async_trait;
use regex_lite::Regex;
use serde_json::json;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

pub const SOURCE_ID: &str = "generative-model";

const SYSTEM_PROMPT: &str = "You are an expert data classifier.";
const TEXT_PLACEHOLDER: &str = "{{text}}";

const PII_FLOOR: f64 = 0.9;
const CONFIDENTIAL_FLOOR: f64 = 0.8;

/// Used when no template locator is configured.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Classify the sensitivity of the following document.\n\
Answer with exactly one line of the form `Classification: <PII|Confidential|None>` \
followed by a line `Confidence: <0.0-1.0>`.\n\n\
Document:\n{{text}}";

pub struct GenerativeClassifier {
    client: reqwest::Client,
    url: String,
    key: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Option<Duration>,
    templates: Arc<dyn TemplateStore>,
    template_locator: Option<String>,
}

impl GenerativeClassifier {
    pub fn new(
        client: reqwest::Client,
        settings: &GenerativeSettings,
        templates: Arc<dyn TemplateStore>,
        template_locator: Option<String>,
    ) -> Self {
        let path = format!(
            "openai/deployments/{}/chat/completions?api-version={}",
            settings.deployment, settings.api_version
        );
        Self {
            client,
            url: join_endpoint(&settings.endpoint, &path),
            key: settings.key.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: settings.timeout_secs.map(Duration::from_secs),
            templates,
            template_locator,
        }
    }

    async fn prompt_for(&self, text: &str) -> Result<String, AdapterUnavailable> {
        let template = match &self.template_locator {
            Some(locator) => self
                .templates
                .fetch_template(locator)
                .await
                .map_err(|e| AdapterUnavailable::Template(e.to_string()))?,
            None => DEFAULT_PROMPT_TEMPLATE.to_string(),
        };
        Ok(template.replacen(TEXT_PLACEHOLDER, text, 1))
    }
}

fn classification_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Classification:\s*(PII|Confidential)").expect("classification pattern is valid")
    })
}

fn confidence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Confidence:\s*([0-9]*\.?[0-9]+)").expect("confidence pattern is valid")
    })
}

/// Derive a label and confidence from a free-text model answer.
///
/// `PII` wins over `Confidential` when both appear. No recognised pattern
/// yields `(Label::None, 0.0)`.
pub fn extract_verdict(answer: &str) -> (Label, f64) {
    let found: Vec<&str> = classification_pattern()
        .captures_iter(answer)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    let (label, floor) = if found.contains(&"PII") {
        (Label::Pii, PII_FLOOR)
    } else if found.contains(&"Confidential") {
        (Label::Confidential, CONFIDENTIAL_FLOOR)
    } else {
        return (Label::None, 0.0);
    };

    let stated = confidence_pattern()
        .captures(answer)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|c| (0.0..=1.0).contains(c));

    (label, stated.map_or(floor, |c| c.max(floor)))
}

#[async_trait]
impl ClassifierAdapter for GenerativeClassifier {
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
        let prompt = self.prompt_for(text).await?;

        let request = self.client.post(&self.url).header("api-key", &self.key).json(&json!({
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature
        }));

        let body = send_json(request).await?;
        let answer = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .ok_or_else(|| AdapterUnavailable::Malformed("no choices[0].message.content".into()))?;
        // A null or empty answer carries no verdict but is not a failure
        let answer = answer.as_str().unwrap_or_default();

        let (label, confidence) = extract_verdict(answer);
        tracing::debug!(%label, confidence, "generative classifier answer parsed");

        Ok(PartialResult::new(SOURCE_ID, label, confidence).with_evidence(json!({ "response": answer })))
    }
}
