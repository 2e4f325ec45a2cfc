//! Argument binding: turning a loosely-typed argument bag into the ordered,
//! validated argument list one function signature declares.

use crate::args::KernelArguments;
use crate::error::{KernelError, KernelResult};
use crate::functions::metadata::{KernelFunctionMetadata, ParameterKind};
use crate::kernel::Kernel;
use crate::services::{AiService, PromptExecutionSettings};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Concrete argument values, one entry per declared parameter, in declaration
/// order.
#[derive(Debug, Clone, Default)]
pub struct BoundArguments {
    entries: Vec<(String, Value)>,
}

impl BoundArguments {
    pub(crate) fn push(&mut self, name: &str, value: Value) {
        self.entries.push((name.to_string(), value));
    }

    /// The bound value for a parameter name.
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(entry_name, _)| entry_name == name)
            .map(|(_, value)| value)
    }

    /// Deserialize the bound value into a concrete type. Optional parameters
    /// bound to `null` deserialize cleanly into `Option<T>`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> KernelResult<T> {
        let value = self
            .get_value(name)
            .ok_or_else(|| KernelError::MissingRequiredParameter(name.to_string()))?;
        serde_json::from_value(value.clone()).map_err(|err| {
            KernelError::ParameterCoercion(format!("parameter '{name}': {err}"))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bound entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}

/// Everything a native function body receives: the bound arguments plus the
/// injectable values the signature asked for.
pub struct InvocationContext {
    /// Present when the signature declares a kernel-kind parameter. A shallow
    /// snapshot of the engine; registries are setup-time state, so the
    /// snapshot sees the same plugins and services as the caller.
    pub kernel: Option<Kernel>,
    pub arguments: BoundArguments,
    pub service: Option<Arc<dyn AiService>>,
    pub settings: Option<PromptExecutionSettings>,
}

/// Bind the argument bag against the function's declared parameters.
///
/// Works descriptor by descriptor in declaration order: an explicitly
/// supplied value always wins (even for a parameter named like an injectable
/// kind); injectable kinds are filled from the engine and the service
/// selector; remaining values fall back to defaults. A required parameter
/// with no value and no default fails with `MissingRequiredParameter`, which
/// the function layer contains into the result. Bag entries beyond the
/// declared parameter set are ignored.
pub(crate) fn bind(
    metadata: &KernelFunctionMetadata,
    kernel: &Kernel,
    arguments: &KernelArguments,
) -> KernelResult<InvocationContext> {
    let mut context = InvocationContext {
        kernel: None,
        arguments: BoundArguments::default(),
        service: None,
        settings: None,
    };
    let mut resolved: Option<(Arc<dyn AiService>, PromptExecutionSettings)> = None;

    for parameter in &metadata.parameters {
        if let Some(supplied) = arguments.get(&parameter.name) {
            // Explicit beats implicit, including for injectable names.
            let value = if parameter.kind == ParameterKind::Structured {
                parameter.coerce(supplied)?
            } else {
                supplied.clone()
            };
            context.arguments.push(&parameter.name, value);
            continue;
        }
        match parameter.kind {
            ParameterKind::Kernel => {
                context.kernel = Some(kernel.clone());
            }
            ParameterKind::Service => {
                let (service, _) =
                    resolve_backend(kernel, metadata, arguments, &mut resolved)?;
                context.service = Some(service);
            }
            ParameterKind::ExecutionSettings => {
                let (_, settings) =
                    resolve_backend(kernel, metadata, arguments, &mut resolved)?;
                context.settings = Some(settings);
            }
            ParameterKind::Value | ParameterKind::Structured => {
                match &parameter.default_value {
                    Some(default_value) => {
                        context.arguments.push(&parameter.name, default_value.clone())
                    }
                    None if parameter.is_required => {
                        return Err(KernelError::MissingRequiredParameter(
                            parameter.name.clone(),
                        ));
                    }
                    None => context.arguments.push(&parameter.name, Value::Null),
                }
            }
        }
    }
    Ok(context)
}

fn resolve_backend(
    kernel: &Kernel,
    metadata: &KernelFunctionMetadata,
    arguments: &KernelArguments,
    resolved: &mut Option<(Arc<dyn AiService>, PromptExecutionSettings)>,
) -> KernelResult<(Arc<dyn AiService>, PromptExecutionSettings)> {
    if let Some((service, settings)) = resolved {
        return Ok((service.clone(), settings.clone()));
    }
    let (service, settings) =
        kernel.resolve_service_and_settings(metadata, arguments, &[], &[])?;
    *resolved = Some((service.clone(), settings.clone()));
    Ok((service, settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::metadata::KernelParameterMetadata;
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
    struct InputObject {
        arg1: String,
        arg2: i64,
    }

    fn metadata() -> KernelFunctionMetadata {
        KernelFunctionMetadata::new("f").with_parameters([
            KernelParameterMetadata::new("text"),
            KernelParameterMetadata::new("count").with_default(3),
        ])
    }

    #[test]
    fn binds_in_declaration_order_with_defaults() {
        let kernel = Kernel::new();
        let args = KernelArguments::new().with("text", "hi").with("unused", true);
        let context = bind(&metadata(), &kernel, &args).unwrap();
        let names: Vec<&str> = context.arguments.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["text", "count"]);
        assert_eq!(context.arguments.get::<i64>("count").unwrap(), 3);
    }

    #[test]
    fn missing_required_parameter_fails() {
        let kernel = Kernel::new();
        let err = bind(&metadata(), &kernel, &KernelArguments::new()).err().unwrap();
        assert_eq!(err, KernelError::MissingRequiredParameter("text".into()));
    }

    #[test]
    fn structured_parameter_accepts_mapping_and_instance_alike() {
        let kernel = Kernel::new();
        let meta = KernelFunctionMetadata::new("f")
            .with_parameters([KernelParameterMetadata::new("obj").structured::<InputObject>()]);

        let from_mapping = bind(
            &meta,
            &kernel,
            &KernelArguments::new().with("obj", json!({"arg1": "test", "arg2": 5})),
        )
        .unwrap();
        let instance = serde_json::to_value(InputObject {
            arg1: "test".into(),
            arg2: 5,
        })
        .unwrap();
        let from_instance = bind(
            &meta,
            &kernel,
            &KernelArguments::new().with("obj", instance),
        )
        .unwrap();

        let a: InputObject = from_mapping.arguments.get("obj").unwrap();
        let b: InputObject = from_instance.arguments.get("obj").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn malformed_mapping_is_a_coercion_error() {
        let kernel = Kernel::new();
        let meta = KernelFunctionMetadata::new("f")
            .with_parameters([KernelParameterMetadata::new("obj").structured::<InputObject>()]);
        let err = bind(
            &meta,
            &kernel,
            &KernelArguments::new().with("obj", json!({"arg1": "only"})),
        )
        .err()
        .unwrap();
        assert!(matches!(err, KernelError::ParameterCoercion(_)));
    }

    #[test]
    fn explicit_value_beats_injectable_kind() {
        let kernel = Kernel::new();
        let meta = KernelFunctionMetadata::new("f")
            .with_parameters([KernelParameterMetadata::service("service")]);
        // No services registered: binding would fail if the injectable path
        // ran, but the caller supplied a plain value under that name.
        let context = bind(
            &meta,
            &kernel,
            &KernelArguments::new().with("service", "not_a_service"),
        )
        .unwrap();
        assert_eq!(
            context.arguments.get_value("service"),
            Some(&json!("not_a_service"))
        );
        assert!(context.service.is_none());
    }

    struct StubService {
        id: String,
    }

    impl AiService for StubService {
        fn service_id(&self) -> &str {
            &self.id
        }

        fn capabilities(&self) -> &[crate::services::ServiceCapability] {
            &[crate::services::ServiceCapability::ChatCompletion]
        }
    }

    #[test]
    fn service_and_settings_kinds_receive_the_resolved_backend() {
        let mut kernel = Kernel::new();
        kernel
            .add_service(Arc::new(StubService { id: "chat".into() }))
            .unwrap();
        let meta = KernelFunctionMetadata::new("f").with_parameters([
            KernelParameterMetadata::service("service"),
            KernelParameterMetadata::execution_settings("settings"),
        ]);
        let context = bind(&meta, &kernel, &KernelArguments::new()).unwrap();
        assert_eq!(context.service.unwrap().service_id(), "chat");
        assert_eq!(
            context.settings.unwrap().service_id.as_deref(),
            Some("chat")
        );
    }

    #[test]
    fn kernel_kind_injects_an_engine_snapshot() {
        let kernel = Kernel::new();
        let meta = KernelFunctionMetadata::new("f")
            .with_parameters([KernelParameterMetadata::kernel("kernel")]);
        let context = bind(&meta, &kernel, &KernelArguments::new()).unwrap();
        assert!(context.kernel.is_some());
    }

    #[test]
    fn optional_parameter_without_default_binds_null() {
        let kernel = Kernel::new();
        let meta = KernelFunctionMetadata::new("f")
            .with_parameters([KernelParameterMetadata::new("note").required(false)]);
        let context = bind(&meta, &kernel, &KernelArguments::new()).unwrap();
        let note: Option<String> = context.arguments.get("note").unwrap();
        assert!(note.is_none());
    }
}
