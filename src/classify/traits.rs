//! Classifier adapter capability and the registry of active adapters

use super::types::{ClassificationHints, PartialResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why a classifier adapter produced no result for this run.
///
/// Recovered inside the orchestrator: the adapter is excluded from the merge
/// and the run continues with the remaining adapters.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterUnavailable {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend rejected credentials: {0}")]
    Unauthorized(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("prompt template unavailable: {0}")]
    Template(String),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("adapter crashed: {0}")]
    Crashed(String),
}

/// A pluggable integration with one external classification backend.
///
/// # Example
///
/// ```ignore
/// struct KeywordClassifier;
///
/// #[async_trait]
/// impl ClassifierAdapter for KeywordClassifier {
///     fn id(&self) -> &str { "keyword" }
///
///     async fn classify(
///         &self,
///         text: &str,
///         _hints: &ClassificationHints,
///     ) -> Result<PartialResult, AdapterUnavailable> {
///         let label = if text.contains("SSN") { Label::Pii } else { Label::None };
///         Ok(PartialResult::new(self.id(), label, 1.0))
///     }
/// }
/// ```
#[async_trait]
pub trait ClassifierAdapter: Send + Sync {
    /// Unique identifier, used as the evidence key in merged results
    fn id(&self) -> &str;

    /// Per-adapter timeout; `None` falls back to the orchestrator default
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Classify extracted text.
    ///
    /// Every transport, authentication or decoding failure must surface as
    /// `AdapterUnavailable`.
    async fn classify(
        &self,
        text: &str,
        hints: &ClassificationHints,
    ) -> Result<PartialResult, AdapterUnavailable>;
}

/// The set of adapters the orchestrator fans out to.
#[derive(Clone, Default)]
pub struct ClassifierRegistry {
    adapters: Vec<Arc<dyn ClassifierAdapter>>,
}

impl ClassifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter
    pub fn register<A: ClassifierAdapter + 'static>(&mut self, adapter: A) {
        self.adapters.push(Arc::new(adapter));
    }

    pub fn register_shared(&mut self, adapter: Arc<dyn ClassifierAdapter>) {
        self.adapters.push(adapter);
    }

    /// Builder-style `register`
    pub fn with<A: ClassifierAdapter + 'static>(mut self, adapter: A) -> Self {
        self.register(adapter);
        self
    }

    pub fn adapters(&self) -> &[Arc<dyn ClassifierAdapter>] {
        &self.adapters
    }

    pub fn ids(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl FromIterator<Arc<dyn ClassifierAdapter>> for ClassifierRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn ClassifierAdapter>>>(iter: I) -> Self {
        Self {
            adapters: iter.into_iter().collect(),
        }
    }
}
