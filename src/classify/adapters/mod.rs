//! Built-in classifier adapters
//!
//! - **ModelEndpointClassifier**: hosted classification model, structured score
//! - **EntityDetectionClassifier**: PII entity recognition service
//! - **GenerativeClassifier**: chat-completion model, keyword-matched verdict
//!
//! `build_registry` turns configuration into the active adapter set; an
//! adapter whose settings are incomplete is simply not registered.

mod entity_detection;
mod generative;
mod model_endpoint;

pub use entity_detection::EntityDetectionClassifier;
pub use generative::{extract_verdict, GenerativeClassifier, DEFAULT_PROMPT_TEMPLATE};
pub use model_endpoint::ModelEndpointClassifier;

use super::traits::{AdapterUnavailable, ClassifierRegistry};
use crate::config::ClassifierSettings;
use crate::extract::TemplateStore;
use reqwest::{RequestBuilder, StatusCode};
use std::sync::Arc;

/// Build the registry of adapters activated by `settings`.
pub fn build_registry(
    settings: &ClassifierSettings,
    client: reqwest::Client,
    templates: Arc<dyn TemplateStore>,
) -> ClassifierRegistry {
    let mut registry = ClassifierRegistry::new();

    if let Some(model) = settings.active_model_endpoint() {
        registry.register(ModelEndpointClassifier::new(client.clone(), model));
    }
    if let Some(entity) = settings.active_entity_detection() {
        registry.register(EntityDetectionClassifier::new(client.clone(), entity));
    }
    if let Some(generative) = settings.active_generative() {
        let template_locator = settings.prompt_template().map(str::to_string);
        if template_locator.is_none() {
            tracing::warn!("generative classifier has no prompt template locator, using built-in template");
        }
        registry.register(GenerativeClassifier::new(
            client,
            generative,
            templates,
            template_locator,
        ));
    }

    tracing::info!(adapters = ?registry.ids(), "classifier registry built");
    registry
}

/// Send a JSON request and decode the JSON response body.
///
/// 401/403 map to `Unauthorized`, other non-2xx and transport failures to
/// `Transport`, undecodable bodies to `Malformed`.
pub(crate) async fn send_json(request: RequestBuilder) -> Result<serde_json::Value, AdapterUnavailable> {
    let response = request
        .send()
        .await
        .map_err(|e| AdapterUnavailable::Transport(e.to_string()))?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(AdapterUnavailable::Unauthorized(format!("status {}", status)));
    }
    if !status.is_success() {
        return Err(AdapterUnavailable::Transport(format!("status {}", status)));
    }

    let body = response
        .text()
        .await
        .map_err(|e| AdapterUnavailable::Transport(e.to_string()))?;
    serde_json::from_str(&body).map_err(|e| AdapterUnavailable::Malformed(e.to_string()))
}

/// Join a base endpoint and a path without doubling the slash.
pub(crate) fn join_endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
