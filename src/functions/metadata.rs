//! Function and parameter metadata.
//!
//! Parameters are declared explicitly at registration time instead of being
//! discovered through runtime reflection: a structured parameter registers a
//! serde-backed coercer and (via `schemars`) a JSON schema when it is
//! declared, so binding never has to inspect the callable.

use crate::error::{KernelError, KernelResult};
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// How a parameter gets its value during binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// A plain value looked up in the argument bag.
    Value,
    /// A structured type constructed from a mapping literal (or an already
    /// constructed instance) through the registered coercer.
    Structured,
    /// Injectable: the invocation engine itself.
    Kernel,
    /// Injectable: the resolved backend service.
    Service,
    /// Injectable: the resolved execution settings.
    ExecutionSettings,
}

type Coercer = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// Describes one declared parameter of a kernel function.
#[derive(Clone)]
pub struct KernelParameterMetadata {
    pub name: String,
    pub description: String,
    /// Semantic type tag: a primitive name or a structured-type name.
    pub type_tag: String,
    pub kind: ParameterKind,
    pub default_value: Option<Value>,
    pub is_required: bool,
    schema: Option<Value>,
    coercer: Option<Coercer>,
}

impl KernelParameterMetadata {
    /// A required string-tagged value parameter. Adjust with the builder
    /// methods below.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            type_tag: "string".to_string(),
            kind: ParameterKind::Value,
            default_value: None,
            is_required: true,
            schema: None,
            coercer: None,
        }
    }

    /// An injectable parameter receiving the invocation engine.
    pub fn kernel(name: impl Into<String>) -> Self {
        let mut parameter = Self::new(name);
        parameter.kind = ParameterKind::Kernel;
        parameter.type_tag = "kernel".to_string();
        parameter.is_required = false;
        parameter
    }

    /// An injectable parameter receiving the resolved service.
    pub fn service(name: impl Into<String>) -> Self {
        let mut parameter = Self::new(name);
        parameter.kind = ParameterKind::Service;
        parameter.type_tag = "service".to_string();
        parameter.is_required = false;
        parameter
    }

    /// An injectable parameter receiving the resolved execution settings.
    pub fn execution_settings(name: impl Into<String>) -> Self {
        let mut parameter = Self::new(name);
        parameter.kind = ParameterKind::ExecutionSettings;
        parameter.type_tag = "execution_settings".to_string();
        parameter.is_required = false;
        parameter
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_type_tag(mut self, type_tag: impl Into<String>) -> Self {
        self.type_tag = type_tag.into();
        self
    }

    /// Attach a default. A parameter with a default is optional unless
    /// [`required`](Self::required) overrides it afterwards.
    pub fn with_default(mut self, default_value: impl Into<Value>) -> Self {
        self.default_value = Some(default_value.into());
        self.is_required = false;
        self
    }

    /// Explicitly override the derived requiredness.
    pub fn required(mut self, is_required: bool) -> Self {
        self.is_required = is_required;
        self
    }

    /// Declare the parameter as a structured type. Registers a serde
    /// round-trip coercer so a nested mapping literal and a pre-constructed
    /// instance bind to the same value, and derives the JSON schema.
    pub fn structured<T>(mut self) -> Self
    where
        T: DeserializeOwned + Serialize + JsonSchema,
    {
        self.kind = ParameterKind::Structured;
        self.type_tag = short_type_name::<T>().to_string();
        self.schema = serde_json::to_value(schemars::schema_for!(T)).ok();
        self.coercer = Some(Arc::new(|value: &Value| {
            let instance: T =
                serde_json::from_value(value.clone()).map_err(|err| err.to_string())?;
            serde_json::to_value(&instance).map_err(|err| err.to_string())
        }));
        self
    }

    /// Run the registered coercer against a supplied value.
    pub(crate) fn coerce(&self, value: &Value) -> KernelResult<Value> {
        match &self.coercer {
            Some(coercer) => coercer(value).map_err(|err| {
                KernelError::ParameterCoercion(format!(
                    "cannot construct '{}' for parameter '{}': {err}",
                    self.type_tag, self.name
                ))
            }),
            None => Ok(value.clone()),
        }
    }

    /// The JSON schema of this parameter, when one was derived.
    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }

    fn validate(&self) -> KernelResult<()> {
        if self.name.is_empty() || self.name.chars().any(char::is_whitespace) {
            return Err(KernelError::FunctionInitialization(format!(
                "invalid parameter name '{}'",
                self.name
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for KernelParameterMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelParameterMetadata")
            .field("name", &self.name)
            .field("type_tag", &self.type_tag)
            .field("kind", &self.kind)
            .field("is_required", &self.is_required)
            .field("default_value", &self.default_value)
            .finish()
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Identity and shape of a kernel function.
#[derive(Debug, Clone)]
pub struct KernelFunctionMetadata {
    pub plugin_name: Option<String>,
    pub name: String,
    pub description: String,
    pub parameters: Vec<KernelParameterMetadata>,
    pub return_type: Option<String>,
    /// Service id resolved for injectable parameters and templated execution
    /// when the caller supplies no execution settings.
    pub default_service_id: Option<String>,
}

impl KernelFunctionMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            plugin_name: None,
            name: name.into(),
            description: String::new(),
            parameters: Vec::new(),
            return_type: None,
            default_service_id: None,
        }
    }

    pub fn with_plugin_name(mut self, plugin_name: impl Into<String>) -> Self {
        self.plugin_name = Some(plugin_name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameters(
        mut self,
        parameters: impl IntoIterator<Item = KernelParameterMetadata>,
    ) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn with_return_type(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = Some(return_type.into());
        self
    }

    pub fn with_default_service_id(mut self, service_id: impl Into<String>) -> Self {
        self.default_service_id = Some(service_id.into());
        self
    }

    /// `Plugin-function` when the function belongs to a plugin, else the bare
    /// function name.
    pub fn fully_qualified_name(&self) -> String {
        match &self.plugin_name {
            Some(plugin_name) => format!("{plugin_name}-{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Validate identity invariants: the function name matches
    /// `^[0-9A-Za-z_]+$` and parameter names are valid and unique.
    pub fn validate(&self) -> KernelResult<()> {
        if !is_valid_function_name(&self.name) {
            return Err(KernelError::FunctionInitialization(format!(
                "invalid function name '{}'",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for parameter in &self.parameters {
            parameter.validate()?;
            if !seen.insert(parameter.name.as_str()) {
                return Err(KernelError::FunctionInitialization(format!(
                    "duplicate parameter '{}' in function '{}'",
                    parameter.name, self.name
                )));
            }
        }
        Ok(())
    }

    /// JSON-schema object describing the declared (non-injectable)
    /// parameters.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for parameter in &self.parameters {
            if !matches!(
                parameter.kind,
                ParameterKind::Value | ParameterKind::Structured
            ) {
                continue;
            }
            let schema = parameter.schema().cloned().unwrap_or_else(|| {
                serde_json::json!({
                    "type": parameter.type_tag,
                    "description": parameter.description,
                })
            });
            properties.insert(parameter.name.clone(), schema);
            if parameter.is_required {
                required.push(Value::String(parameter.name.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn is_valid_function_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct InputObject {
        arg1: String,
        arg2: i64,
    }

    #[test]
    fn name_pattern_is_enforced() {
        assert!(KernelFunctionMetadata::new("valid_name_1").validate().is_ok());
        for bad in ["", "has space", "has-dash", "emoji🙂"] {
            let err = KernelFunctionMetadata::new(bad).validate().unwrap_err();
            assert!(matches!(err, KernelError::FunctionInitialization(_)), "{bad}");
        }
    }

    #[test]
    fn duplicate_parameter_names_are_rejected() {
        let metadata = KernelFunctionMetadata::new("f").with_parameters([
            KernelParameterMetadata::new("x"),
            KernelParameterMetadata::new("x"),
        ]);
        assert!(matches!(
            metadata.validate(),
            Err(KernelError::FunctionInitialization(_))
        ));
    }

    #[test]
    fn default_value_makes_parameter_optional() {
        let parameter = KernelParameterMetadata::new("x").with_default("fallback");
        assert!(!parameter.is_required);
        let overridden = KernelParameterMetadata::new("x")
            .with_default("fallback")
            .required(true);
        assert!(overridden.is_required);
    }

    #[test]
    fn structured_parameter_coerces_mappings() {
        let parameter = KernelParameterMetadata::new("obj").structured::<InputObject>();
        assert_eq!(parameter.kind, ParameterKind::Structured);
        assert_eq!(parameter.type_tag, "InputObject");
        let coerced = parameter
            .coerce(&json!({"arg1": "test", "arg2": 5}))
            .unwrap();
        assert_eq!(coerced, json!({"arg1": "test", "arg2": 5}));
        assert!(matches!(
            parameter.coerce(&json!({"arg1": "test"})),
            Err(KernelError::ParameterCoercion(_))
        ));
    }

    #[test]
    fn fully_qualified_name_includes_plugin() {
        let metadata = KernelFunctionMetadata::new("func").with_plugin_name("Plugin");
        assert_eq!(metadata.fully_qualified_name(), "Plugin-func");
        assert_eq!(KernelFunctionMetadata::new("func").fully_qualified_name(), "func");
    }

    #[test]
    fn parameters_schema_skips_injectables() {
        let metadata = KernelFunctionMetadata::new("f").with_parameters([
            KernelParameterMetadata::new("text").with_description("the text"),
            KernelParameterMetadata::new("count").with_type_tag("integer").with_default(1),
            KernelParameterMetadata::kernel("kernel"),
            KernelParameterMetadata::service("service"),
        ]);
        let schema = metadata.parameters_schema();
        let properties = schema["properties"].as_object().unwrap();
        assert_eq!(properties.len(), 2);
        assert_eq!(schema["required"], json!(["text"]));
    }
}
