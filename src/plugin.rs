//! Plugins: named collections of kernel functions, and the two-level
//! plugin-name → function-name registry the kernel resolves calls through.

use crate::error::{KernelError, KernelResult};
use crate::functions::KernelFunction;
use std::collections::HashMap;
use std::sync::Arc;

/// A named collection of kernel functions. Function names are unique within
/// the plugin.
#[derive(Clone, Default)]
pub struct KernelPlugin {
    name: String,
    pub description: String,
    functions: HashMap<String, Arc<dyn KernelFunction>>,
}

impl KernelPlugin {
    /// Create an empty plugin. The name must contain at least one
    /// non-whitespace character.
    pub fn new(name: impl Into<String>) -> KernelResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(KernelError::FunctionInitialization(
                "plugin name must not be blank".into(),
            ));
        }
        Ok(Self {
            name,
            ..Self::default()
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a function, rejecting duplicates by name.
    pub fn add(&mut self, function: Arc<dyn KernelFunction>) -> KernelResult<()> {
        let function_name = function.metadata().name.clone();
        if self.functions.contains_key(&function_name) {
            return Err(KernelError::FunctionAlreadyExists(format!(
                "function '{function_name}' already exists in plugin '{}'",
                self.name
            )));
        }
        self.functions.insert(function_name, function);
        Ok(())
    }

    pub fn get(&self, function_name: &str) -> Option<&Arc<dyn KernelFunction>> {
        self.functions.get(function_name)
    }

    pub fn contains(&self, function_name: &str) -> bool {
        self.functions.contains_key(function_name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    pub fn functions(&self) -> impl Iterator<Item = &Arc<dyn KernelFunction>> {
        self.functions.values()
    }
}

impl std::fmt::Debug for KernelPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelPlugin")
            .field("name", &self.name)
            .field("function_names", &self.function_names())
            .finish()
    }
}

/// The kernel's plugin registry. Plugin names are unique.
#[derive(Clone, Default)]
pub struct KernelPluginCollection {
    plugins: HashMap<String, KernelPlugin>,
}

impl KernelPluginCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, rejecting duplicates by name.
    pub fn add(&mut self, plugin: KernelPlugin) -> KernelResult<()> {
        if self.plugins.contains_key(plugin.name()) {
            return Err(KernelError::FunctionAlreadyExists(format!(
                "plugin '{}' already exists",
                plugin.name()
            )));
        }
        self.plugins.insert(plugin.name().to_string(), plugin);
        Ok(())
    }

    pub fn get(&self, plugin_name: &str) -> KernelResult<&KernelPlugin> {
        self.plugins
            .get(plugin_name)
            .ok_or_else(|| KernelError::PluginNotFound(plugin_name.to_string()))
    }

    pub(crate) fn get_mut(&mut self, plugin_name: &str) -> Option<&mut KernelPlugin> {
        self.plugins.get_mut(plugin_name)
    }

    /// Resolve a function through the two-level namespace.
    pub fn get_function(
        &self,
        plugin_name: &str,
        function_name: &str,
    ) -> KernelResult<Arc<dyn KernelFunction>> {
        self.get(plugin_name)?
            .get(function_name)
            .cloned()
            .ok_or_else(|| KernelError::FunctionNotFound(function_name.to_string()))
    }

    pub fn contains(&self, plugin_name: &str) -> bool {
        self.plugins.contains_key(plugin_name)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn plugins(&self) -> impl Iterator<Item = &KernelPlugin> {
        self.plugins.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{KernelFunctionFromMethod, KernelFunctionMetadata};
    use serde_json::Value;

    fn noop(name: &str) -> Arc<dyn KernelFunction> {
        Arc::new(
            KernelFunctionFromMethod::from_sync(KernelFunctionMetadata::new(name), |_context| {
                Ok(Value::Null)
            })
            .unwrap(),
        )
    }

    #[test]
    fn blank_plugin_name_is_rejected() {
        assert!(matches!(
            KernelPlugin::new("  "),
            Err(KernelError::FunctionInitialization(_))
        ));
    }

    #[test]
    fn duplicate_function_name_is_rejected() {
        let mut plugin = KernelPlugin::new("test").unwrap();
        plugin.add(noop("func")).unwrap();
        assert!(matches!(
            plugin.add(noop("func")),
            Err(KernelError::FunctionAlreadyExists(_))
        ));
        assert_eq!(plugin.len(), 1);
    }

    #[test]
    fn collection_counts_distinct_plugins() {
        let mut collection = KernelPluginCollection::new();
        collection.add(KernelPlugin::new("one").unwrap()).unwrap();
        collection.add(KernelPlugin::new("two").unwrap()).unwrap();
        assert_eq!(collection.len(), 2);
        assert!(matches!(
            collection.add(KernelPlugin::new("one").unwrap()),
            Err(KernelError::FunctionAlreadyExists(_))
        ));
    }

    #[test]
    fn function_lookup_reports_the_missing_level() {
        let mut collection = KernelPluginCollection::new();
        let mut plugin = KernelPlugin::new("test").unwrap();
        plugin.add(noop("present")).unwrap();
        collection.add(plugin).unwrap();

        assert!(collection.get_function("test", "present").is_ok());
        assert!(matches!(
            collection.get_function("ghost", "present"),
            Err(KernelError::PluginNotFound(_))
        ));
        assert!(matches!(
            collection.get_function("test", "ghost"),
            Err(KernelError::FunctionNotFound(_))
        ));
    }
}
