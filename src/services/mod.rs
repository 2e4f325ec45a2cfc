//! Backend service abstractions.
//!
//! A service is any capability-tagged client registered under a logical id:
//! a chat or text completion model, an embedding model, or a semantic memory
//! store. The kernel never talks to a provider's wire protocol; it resolves a
//! service through the [`ServiceRegistry`] and calls it through one of the
//! capability traits below.

mod registry;

pub use registry::{DEFAULT_SERVICE_ID, ServiceRegistry};

use crate::error::KernelResult;
use crate::memory::MemoryService;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Capability tags a service can satisfy, used for type-based selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCapability {
    TextCompletion,
    ChatCompletion,
    Embedding,
    Memory,
}

/// Execution configuration for a service call: the resolved service id plus
/// provider-specific extension data (temperature, max tokens, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptExecutionSettings {
    /// The logical id of the service these settings apply to.
    pub service_id: Option<String>,
    /// Provider-specific key/value settings.
    #[serde(default)]
    pub extension_data: serde_json::Map<String, Value>,
}

impl PromptExecutionSettings {
    /// Settings bound to a service id.
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: Some(service_id.into()),
            extension_data: serde_json::Map::new(),
        }
    }

    /// Builder-style insert into the extension data.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.extension_data.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extension_data.get(key)
    }

    /// Merge `overrides` atop these settings. Override entries win key by key;
    /// an override service id replaces the current one when set.
    pub fn merge(&mut self, overrides: &PromptExecutionSettings) {
        if overrides.service_id.is_some() {
            self.service_id = overrides.service_id.clone();
        }
        for (key, value) in &overrides.extension_data {
            self.extension_data.insert(key.clone(), value.clone());
        }
    }
}

/// A backend service registered in the kernel.
///
/// Capability access goes through the explicit `as_*` accessors rather than
/// downcasting; a service advertises a capability by both listing the tag and
/// overriding the matching accessor.
pub trait AiService: Send + Sync {
    /// The logical id this service is registered under.
    fn service_id(&self) -> &str;

    /// The capability tags this service satisfies.
    fn capabilities(&self) -> &[ServiceCapability];

    /// Instantiate the provider's execution settings bound to this service id.
    /// Providers with defaults (temperature, model, ...) override this.
    fn execution_settings(&self) -> PromptExecutionSettings {
        PromptExecutionSettings::new(self.service_id())
    }

    /// The completion surface of this service, when it has one.
    fn as_completion(&self) -> Option<&dyn CompletionService> {
        None
    }

    /// The semantic-memory surface of this service, when it has one.
    fn as_memory(&self) -> Option<&dyn MemoryService> {
        None
    }
}

/// A service that can turn rendered prompt text into completed text.
#[async_trait::async_trait]
pub trait CompletionService: AiService {
    /// Produce the full completion for a rendered prompt.
    async fn complete(
        &self,
        prompt: &str,
        settings: &PromptExecutionSettings,
    ) -> KernelResult<String>;

    /// Produce the completion incrementally. The default falls back to a
    /// single-chunk stream over [`complete`](Self::complete).
    fn complete_stream<'a>(
        &'a self,
        prompt: &'a str,
        settings: &'a PromptExecutionSettings,
    ) -> BoxStream<'a, KernelResult<String>> {
        Box::pin(async_stream::stream! {
            yield self.complete(prompt, settings).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overrides_win() {
        let mut base = PromptExecutionSettings::new("gpt")
            .with("temperature", json!(0.0))
            .with("max_tokens", json!(256));
        let overrides = PromptExecutionSettings::new("gpt").with("temperature", json!(0.7));
        base.merge(&overrides);
        assert_eq!(base.get("temperature"), Some(&json!(0.7)));
        assert_eq!(base.get("max_tokens"), Some(&json!(256)));
    }

    #[test]
    fn settings_round_trip_through_serde() {
        let settings = PromptExecutionSettings::new("svc").with("top_p", json!(0.9));
        let value = serde_json::to_value(&settings).unwrap();
        let back: PromptExecutionSettings = serde_json::from_value(value).unwrap();
        assert_eq!(back, settings);
    }
}
