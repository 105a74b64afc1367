//! Mock classification and remediation backends
//!
//! Each backend gets its own wiremock server so tests can assert exactly how
//! often the pipeline reached it.

use lakesentry::config::{EntityDetectionSettings, GenerativeSettings, ModelEndpointSettings};
use lakesentry::SentinelConfig;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// One mock server per external service the pipeline talks to.
pub struct Backends {
    pub model: MockServer,
    pub entities: MockServer,
    pub generative: MockServer,
    pub remediation: MockServer,
}

impl Backends {
    pub async fn start() -> Self {
        Self {
            model: MockServer::start().await,
            entities: MockServer::start().await,
            generative: MockServer::start().await,
            remediation: MockServer::start().await,
        }
    }

    /// Configuration with no classifier active and remediation pointed at
    /// the mock remediation server.
    pub fn base_config(&self) -> SentinelConfig {
        let mut config = SentinelConfig::default();
        config.root_container = "data".into();
        config.classifiers.default_timeout_secs = 5;
        config.remediation.url = Some(format!("{}/remediate", self.remediation.uri()));
        config.remediation.timeout_secs = 2;
        config
    }

    pub fn with_model_endpoint(&self, config: &mut SentinelConfig) {
        config.classifiers.model_endpoint = Some(ModelEndpointSettings {
            url: format!("{}/score", self.model.uri()),
            key: Some("model-key".into()),
            timeout_secs: None,
        });
    }

    pub fn with_entity_detection(&self, config: &mut SentinelConfig) {
        config.classifiers.entity_detection = Some(EntityDetectionSettings {
            endpoint: self.entities.uri(),
            key: "lang-key".into(),
            language: "en".into(),
            timeout_secs: None,
        });
    }

    pub fn with_generative(&self, config: &mut SentinelConfig, template_locator: Option<String>) {
        config.classifiers.generative = Some(GenerativeSettings::new(self.generative.uri(), "llm-key"));
        config.classifiers.prompt_template = template_locator;
    }
}

/// Entity detection answering with the given entities.
pub async fn mount_entities(server: &MockServer, entities: Value) {
    Mock::given(method("POST"))
        .and(path("/text/analytics/v3.1/pii"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [{ "id": "1", "entities": entities, "warnings": [] }],
            "errors": []
        })))
        .mount(server)
        .await;
}

/// Model endpoint answering with a status code and body.
pub async fn mount_model_score(server: &MockServer, status: u16, body: Value) {
    Mock::given(method("POST"))
        .and(path("/score"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

/// Chat completion answering with the given assistant text.
pub async fn mount_completion(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/openai/deployments/[^/]+/chat/completions$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        })))
        .mount(server)
        .await;
}

/// Remediation actor answering with a status code and text, expected `times` times.
pub async fn mount_remediation(server: &MockServer, status: u16, body: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/remediate"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .expect(times)
        .mount(server)
        .await;
}
