//! The argument bag threaded through binding and events for one invocation.

use crate::services::PromptExecutionSettings;
use serde_json::Value;
use std::collections::HashMap;

/// Reserved key for unstructured input.
pub const INPUT_KEY: &str = "input";

/// A string-keyed collection of argument values for one invocation, plus the
/// execution settings requested for specific service ids.
///
/// The bag is passed by reference through the whole event pipeline, so
/// handlers observe each other's mutations. The contract for a given key is
/// last write wins.
#[derive(Debug, Clone, Default)]
pub struct KernelArguments {
    values: HashMap<String, Value>,
    execution_settings: Vec<(String, PromptExecutionSettings)>,
}

impl KernelArguments {
    /// Create an empty argument bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Builder-style insert under the reserved [`INPUT_KEY`].
    pub fn with_input(self, value: impl Into<Value>) -> Self {
        self.with(INPUT_KEY, value)
    }

    /// Builder-style attachment of execution settings.
    pub fn with_execution_settings(mut self, settings: PromptExecutionSettings) -> Self {
        self.set_execution_settings(settings);
        self
    }

    /// Insert or overwrite a value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Look up a value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Look up a value and render it as a string, the way a template variable
    /// would be rendered. Strings come back unquoted.
    pub fn get_as_string(&self, name: &str) -> Option<String> {
        self.values.get(name).map(|value| match value {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    /// Remove a value by name.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Attach execution settings, keyed by the settings' service id (or the
    /// reserved `"default"` id when unset). Settings for an id already present
    /// are replaced.
    pub fn set_execution_settings(&mut self, settings: PromptExecutionSettings) {
        let service_id = settings
            .service_id
            .clone()
            .unwrap_or_else(|| crate::services::DEFAULT_SERVICE_ID.to_string());
        if let Some(entry) = self
            .execution_settings
            .iter_mut()
            .find(|(id, _)| *id == service_id)
        {
            entry.1 = settings;
        } else {
            self.execution_settings.push((service_id, settings));
        }
    }

    /// Execution settings attached for a specific service id.
    pub fn execution_settings(&self, service_id: &str) -> Option<&PromptExecutionSettings> {
        self.execution_settings
            .iter()
            .find(|(id, _)| id == service_id)
            .map(|(_, settings)| settings)
    }

    /// Attached execution settings, in attachment order.
    pub fn execution_settings_iter(
        &self,
    ) -> impl Iterator<Item = (&str, &PromptExecutionSettings)> {
        self.execution_settings
            .iter()
            .map(|(id, settings)| (id.as_str(), settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn last_write_wins() {
        let mut args = KernelArguments::new().with("city", "Paris");
        args.set("city", "Lyon");
        assert_eq!(args.get("city"), Some(&json!("Lyon")));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn input_key_is_reserved_name() {
        let args = KernelArguments::new().with_input("hello");
        assert_eq!(args.get(INPUT_KEY), Some(&json!("hello")));
    }

    #[test]
    fn string_rendering_is_unquoted() {
        let args = KernelArguments::new().with("a", "text").with("n", 3);
        assert_eq!(args.get_as_string("a").as_deref(), Some("text"));
        assert_eq!(args.get_as_string("n").as_deref(), Some("3"));
        assert_eq!(args.get_as_string("missing"), None);
    }

    #[test]
    fn execution_settings_keyed_by_service_id() {
        let mut args = KernelArguments::new();
        args.set_execution_settings(PromptExecutionSettings::new("gpt"));
        args.set_execution_settings(
            PromptExecutionSettings::new("gpt").with("temperature", json!(0.5)),
        );
        let settings = args.execution_settings("gpt").unwrap();
        assert_eq!(settings.get("temperature"), Some(&json!(0.5)));
        assert_eq!(args.execution_settings_iter().count(), 1);
    }
}
