//! The outcome of one function invocation.

use crate::error::KernelError;
use crate::functions::metadata::KernelFunctionMetadata;
use serde_json::Value;
use std::collections::HashMap;

/// Metadata key set to `true` when a pre-invocation handler cancelled the
/// call.
pub const CANCELLED_KEY: &str = "cancelled";

/// Metadata key carrying the invocation id assigned by the kernel.
pub const INVOCATION_ID_KEY: &str = "invocation_id";

/// The result of invoking a kernel function.
///
/// A contained failure of the wrapped body lives in [`exception`]; a result
/// with no value and no exception is a valid "ran, produced nothing" outcome.
/// Callers must inspect [`exception`](Self::exception) after any successful
/// return to know whether the underlying logic actually succeeded.
#[derive(Debug, Clone, Default)]
pub struct FunctionResult {
    pub function_name: String,
    pub plugin_name: Option<String>,
    /// The produced output; type depends on the function.
    pub value: Option<Value>,
    /// String form of the output, when applicable.
    pub rendered_output: Option<String>,
    pub metadata: HashMap<String, Value>,
    exception: Option<KernelError>,
}

impl FunctionResult {
    pub fn new(function: &KernelFunctionMetadata) -> Self {
        Self {
            function_name: function.name.clone(),
            plugin_name: function.plugin_name.clone(),
            ..Self::default()
        }
    }

    /// A result carrying a contained failure instead of a value.
    pub fn from_error(function: &KernelFunctionMetadata, error: KernelError) -> Self {
        Self::new(function).with_exception(error)
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_rendered_output(mut self, rendered_output: impl Into<String>) -> Self {
        self.rendered_output = Some(rendered_output.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_exception(mut self, error: KernelError) -> Self {
        self.exception = Some(error);
        self
    }

    /// The contained failure, if the wrapped body (or binding) failed.
    pub fn exception(&self) -> Option<&KernelError> {
        self.exception.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.exception, Some(KernelError::Cancelled(_)))
    }

    /// The value as an unquoted string, falling back to the rendered output.
    pub fn value_as_string(&self) -> Option<String> {
        match &self.value {
            Some(Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
            None => self.rendered_output.clone(),
        }
    }
}

impl std::fmt::Display for FunctionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value_as_string().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_uses_unquoted_value() {
        let metadata = KernelFunctionMetadata::new("f");
        let result = FunctionResult::new(&metadata).with_value(json!("hello"));
        assert_eq!(result.to_string(), "hello");
        let result = FunctionResult::new(&metadata).with_value(json!([1, 2]));
        assert_eq!(result.to_string(), "[1,2]");
    }

    #[test]
    fn empty_result_is_valid() {
        let metadata = KernelFunctionMetadata::new("f");
        let result = FunctionResult::new(&metadata);
        assert!(result.value.is_none());
        assert!(result.exception().is_none());
        assert_eq!(result.to_string(), "");
    }

    #[test]
    fn cancellation_is_visible() {
        let metadata = KernelFunctionMetadata::new("f");
        let result = FunctionResult::from_error(
            &metadata,
            KernelError::Cancelled("f".into()),
        );
        assert!(result.is_cancelled());
    }
}
