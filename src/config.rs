//! Process-wide configuration
//!
//! Loaded once at startup (YAML file, then `LAKESENTRY_*` environment
//! overrides), validated, and passed explicitly into every component.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// Container name; file paths are derived relative to it
    pub root_container: String,
    pub classifiers: ClassifierSettings,
    pub extraction: ExtractionSettings,
    pub queue: QueueSettings,
    pub metadata: MetadataSettings,
    pub remediation: RemediationSettings,
    pub server: ServerSettings,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            root_container: "data".to_string(),
            classifiers: ClassifierSettings::default(),
            extraction: ExtractionSettings::default(),
            queue: QueueSettings::default(),
            metadata: MetadataSettings::default(),
            remediation: RemediationSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub default_timeout_secs: u64,
    pub model_endpoint: Option<ModelEndpointSettings>,
    pub entity_detection: Option<EntityDetectionSettings>,
    pub generative: Option<GenerativeSettings>,
    /// Locator of the prompt template used by the generative adapter
    pub prompt_template: Option<String>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            model_endpoint: None,
            entity_detection: None,
            generative: None,
            prompt_template: None,
        }
    }
}

impl ClassifierSettings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Model endpoint settings, if the required URL is present.
    pub fn active_model_endpoint(&self) -> Option<&ModelEndpointSettings> {
        self.model_endpoint.as_ref().filter(|m| !m.url.trim().is_empty())
    }

    /// Entity detection settings, if both endpoint and key are present.
    pub fn active_entity_detection(&self) -> Option<&EntityDetectionSettings> {
        self.entity_detection
            .as_ref()
            .filter(|e| !e.endpoint.trim().is_empty() && !e.key.trim().is_empty())
    }

    /// Generative settings, if both endpoint and key are present.
    pub fn active_generative(&self) -> Option<&GenerativeSettings> {
        self.generative
            .as_ref()
            .filter(|g| !g.endpoint.trim().is_empty() && !g.key.trim().is_empty())
    }

    pub fn prompt_template(&self) -> Option<&str> {
        self.prompt_template
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEndpointSettings {
    pub url: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDetectionSettings {
    pub endpoint: String,
    pub key: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerativeSettings {
    pub endpoint: String,
    pub key: String,
    #[serde(default = "default_deployment")]
    pub deployment: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_deployment() -> String {
    "classifier".to_string()
}

fn default_api_version() -> String {
    "2023-05-15".to_string()
}

fn default_max_tokens() -> u32 {
    200
}

fn default_temperature() -> f32 {
    0.7
}

impl GenerativeSettings {
    pub fn new(endpoint: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            key: key.into(),
            deployment: default_deployment(),
            api_version: default_api_version(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Falls back to `classifiers.default_timeout_secs`
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub capacity: usize,
    pub batch_size: usize,
    /// Deliveries attempted before a retryable message is dead-lettered
    pub max_deliveries: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: 1024,
            batch_size: 16,
            max_deliveries: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSettings {
    /// Remote metadata sink; dispatch stays in-process when absent
    pub dispatch_url: Option<String>,
    pub db_path: Option<PathBuf>,
    /// Bound on one dispatch; falls back to `classifiers.default_timeout_secs`
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationSettings {
    /// Remote remediation actor; the in-process restrictor is used when absent
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RemediationSettings {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
        }
    }
}

impl RemediationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7070".to_string(),
        }
    }
}

impl SentinelConfig {
    /// Load from an optional YAML file, apply process environment overrides,
    /// and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let env: HashMap<String, String> = std::env::vars()
            .filter(|(k, _)| k.starts_with("LAKESENTRY_"))
            .collect();
        config.apply_overrides(&env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Apply `LAKESENTRY_*` overrides from the given variable map.
    pub fn apply_overrides(&mut self, vars: &HashMap<String, String>) -> Result<(), ConfigError> {
        let get = |name: &str| {
            vars.get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("LAKESENTRY_ROOT_CONTAINER") {
            self.root_container = v;
        }
        if let Some(v) = get("LAKESENTRY_DEFAULT_TIMEOUT_SECS") {
            self.classifiers.default_timeout_secs = parse_num("LAKESENTRY_DEFAULT_TIMEOUT_SECS", &v)?;
        }

        if let Some(url) = get("LAKESENTRY_MODEL_ENDPOINT_URL") {
            let model = self.classifiers.model_endpoint.get_or_insert(ModelEndpointSettings {
                url: String::new(),
                key: None,
                timeout_secs: None,
            });
            model.url = url;
        }
        if let Some(key) = get("LAKESENTRY_MODEL_ENDPOINT_KEY") {
            if let Some(model) = self.classifiers.model_endpoint.as_mut() {
                model.key = Some(key);
            }
        }

        let entity_endpoint = get("LAKESENTRY_ENTITY_DETECTION_ENDPOINT");
        let entity_key = get("LAKESENTRY_ENTITY_DETECTION_KEY");
        if entity_endpoint.is_some() || entity_key.is_some() {
            let entity = self
                .classifiers
                .entity_detection
                .get_or_insert(EntityDetectionSettings {
                    endpoint: String::new(),
                    key: String::new(),
                    language: default_language(),
                    timeout_secs: None,
                });
            if let Some(endpoint) = entity_endpoint {
                entity.endpoint = endpoint;
            }
            if let Some(key) = entity_key {
                entity.key = key;
            }
        }

        let gen_endpoint = get("LAKESENTRY_GENERATIVE_ENDPOINT");
        let gen_key = get("LAKESENTRY_GENERATIVE_KEY");
        if gen_endpoint.is_some() || gen_key.is_some() {
            let generative = self
                .classifiers
                .generative
                .get_or_insert_with(|| GenerativeSettings::new("", ""));
            if let Some(endpoint) = gen_endpoint {
                generative.endpoint = endpoint;
            }
            if let Some(key) = gen_key {
                generative.key = key;
            }
        }
        if let Some(deployment) = get("LAKESENTRY_GENERATIVE_DEPLOYMENT") {
            if let Some(generative) = self.classifiers.generative.as_mut() {
                generative.deployment = deployment;
            }
        }
        if let Some(v) = get("LAKESENTRY_PROMPT_TEMPLATE") {
            self.classifiers.prompt_template = Some(v);
        }

        if let Some(v) = get("LAKESENTRY_METADATA_URL") {
            self.metadata.dispatch_url = Some(v);
        }
        if let Some(v) = get("LAKESENTRY_EXTRACTION_TIMEOUT_SECS") {
            self.extraction.timeout_secs = Some(parse_num("LAKESENTRY_EXTRACTION_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("LAKESENTRY_METADATA_TIMEOUT_SECS") {
            self.metadata.timeout_secs = Some(parse_num("LAKESENTRY_METADATA_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("LAKESENTRY_DB_PATH") {
            self.metadata.db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("LAKESENTRY_REMEDIATION_URL") {
            self.remediation.url = Some(v);
        }
        if let Some(v) = get("LAKESENTRY_BIND") {
            self.server.bind = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_container.trim().is_empty() {
            return Err(invalid("root_container", "must not be empty"));
        }
        if self.queue.capacity == 0 {
            return Err(invalid("queue.capacity", "must be at least 1"));
        }
        if self.queue.batch_size == 0 {
            return Err(invalid("queue.batch_size", "must be at least 1"));
        }
        if self.queue.max_deliveries == 0 {
            return Err(invalid("queue.max_deliveries", "must be at least 1"));
        }
        let timeouts = [
            ("classifiers.default_timeout_secs", Some(self.classifiers.default_timeout_secs)),
            (
                "classifiers.model_endpoint.timeout_secs",
                self.classifiers.model_endpoint.as_ref().and_then(|m| m.timeout_secs),
            ),
            (
                "classifiers.entity_detection.timeout_secs",
                self.classifiers.entity_detection.as_ref().and_then(|e| e.timeout_secs),
            ),
            (
                "classifiers.generative.timeout_secs",
                self.classifiers.generative.as_ref().and_then(|g| g.timeout_secs),
            ),
            ("extraction.timeout_secs", self.extraction.timeout_secs),
            ("metadata.timeout_secs", self.metadata.timeout_secs),
            ("remediation.timeout_secs", Some(self.remediation.timeout_secs)),
        ];
        if let Some((key, _)) = timeouts.iter().find(|(_, secs)| *secs == Some(0)) {
            return Err(invalid(key, "must be at least 1 second"));
        }
        if let Some(generative) = &self.classifiers.generative {
            if !(0.0..=2.0).contains(&generative.temperature) {
                return Err(invalid("classifiers.generative.temperature", "must be within 0..=2"));
            }
        }
        self.bind_addr()?;
        Ok(())
    }

    /// Bound on fetching one file's content.
    pub fn extraction_timeout(&self) -> Duration {
        self.extraction
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.classifiers.default_timeout())
    }

    /// Bound on one hand-off to the metadata sink.
    pub fn dispatch_timeout(&self) -> Duration {
        self.metadata
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.classifiers.default_timeout())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|e: std::net::AddrParseError| invalid("server.bind", e.to_string()))
    }

    /// Names of the classifier adapters this configuration activates.
    pub fn active_adapters(&self) -> Vec<&'static str> {
        let mut active = Vec::new();
        if self.classifiers.active_model_endpoint().is_some() {
            active.push("model-endpoint");
        }
        if self.classifiers.active_entity_detection().is_some() {
            active.push("entity-detection");
        }
        if self.classifiers.active_generative().is_some() {
            active.push("generative-model");
        }
        active
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| invalid(key, format!("'{}' is not a number", value)))
}
