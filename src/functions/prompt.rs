//! Templated kernel functions: a prompt template bound to a completion
//! service.

use crate::args::KernelArguments;
use crate::error::{KernelError, KernelResult};
use crate::functions::metadata::{KernelFunctionMetadata, KernelParameterMetadata};
use crate::functions::result::FunctionResult;
use crate::functions::{KernelFunction, StreamingFunctionResult};
use crate::kernel::Kernel;
use crate::services::{PromptExecutionSettings, ServiceCapability};
use crate::template::PromptTemplateEngine;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;

/// Capabilities a templated function accepts from the service selector, in
/// preference order.
const COMPLETION_CAPABILITIES: &[ServiceCapability] = &[
    ServiceCapability::ChatCompletion,
    ServiceCapability::TextCompletion,
];

/// Metadata key on prompt results carrying the rendered prompt text.
pub const PROMPT_KEY: &str = "prompt";

/// Configuration of a prompt template: the template text plus the execution
/// settings to use per logical service id.
#[derive(Debug, Clone, Default)]
pub struct PromptTemplateConfig {
    pub template: String,
    pub description: String,
    execution_settings: Vec<(String, PromptExecutionSettings)>,
}

impl PromptTemplateConfig {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attach execution settings, keyed by their service id (reserved
    /// `"default"` id when unset).
    pub fn with_execution_settings(mut self, settings: PromptExecutionSettings) -> Self {
        let service_id = settings
            .service_id
            .clone()
            .unwrap_or_else(|| crate::services::DEFAULT_SERVICE_ID.to_string());
        self.execution_settings.push((service_id, settings));
        self
    }

    pub(crate) fn execution_settings(&self) -> &[(String, PromptExecutionSettings)] {
        &self.execution_settings
    }
}

/// A kernel function that renders a prompt template and sends it to a
/// resolved completion service.
pub struct KernelFunctionFromPrompt {
    metadata: KernelFunctionMetadata,
    config: PromptTemplateConfig,
    engine: Arc<dyn PromptTemplateEngine>,
}

impl KernelFunctionFromPrompt {
    /// Compile a templated function. The template is validated here, so an
    /// empty or malformed template fails with `TemplateSyntax` before any
    /// event handler can run; the template's variables become the function's
    /// parameters.
    pub fn new(
        function_name: impl Into<String>,
        plugin_name: Option<&str>,
        config: PromptTemplateConfig,
        engine: Arc<dyn PromptTemplateEngine>,
    ) -> KernelResult<Self> {
        let variables = engine.variables(&config.template)?;
        let mut metadata = KernelFunctionMetadata::new(function_name)
            .with_description(config.description.clone())
            .with_parameters(
                variables
                    .into_iter()
                    .map(|name| KernelParameterMetadata::new(name).required(false)),
            )
            .with_return_type("string");
        if let Some(plugin_name) = plugin_name {
            metadata = metadata.with_plugin_name(plugin_name);
        }
        metadata.validate()?;
        Ok(Self {
            metadata,
            config,
            engine,
        })
    }
}

#[async_trait::async_trait]
impl KernelFunction for KernelFunctionFromPrompt {
    fn metadata(&self) -> &KernelFunctionMetadata {
        &self.metadata
    }

    async fn invoke(
        &self,
        kernel: &Kernel,
        arguments: &KernelArguments,
    ) -> KernelResult<FunctionResult> {
        let (service, settings) = kernel.resolve_service_and_settings(
            &self.metadata,
            arguments,
            self.config.execution_settings(),
            COMPLETION_CAPABILITIES,
        )?;
        let completion = service.as_completion().ok_or_else(|| {
            KernelError::InvalidServiceType(format!(
                "service '{}' exposes no completion surface",
                service.service_id()
            ))
        })?;
        let prompt = self.engine.render(&self.config.template, arguments)?;
        tracing::debug!(
            function = %self.metadata.fully_qualified_name(),
            service_id = %service.service_id(),
            "rendering prompt and calling completion service"
        );
        let result = FunctionResult::new(&self.metadata)
            .with_metadata(PROMPT_KEY, Value::String(prompt.clone()));
        match completion.complete(&prompt, &settings).await {
            Ok(text) => Ok(result
                .with_value(Value::String(text.clone()))
                .with_rendered_output(text)),
            Err(error) => Ok(result.with_exception(error)),
        }
    }

    async fn invoke_stream(
        &self,
        kernel: &Kernel,
        arguments: &KernelArguments,
    ) -> KernelResult<StreamingFunctionResult> {
        let (service, settings) = kernel.resolve_service_and_settings(
            &self.metadata,
            arguments,
            self.config.execution_settings(),
            COMPLETION_CAPABILITIES,
        )?;
        if service.as_completion().is_none() {
            return Err(KernelError::InvalidServiceType(format!(
                "service '{}' exposes no completion surface",
                service.service_id()
            )));
        }
        let prompt = self.engine.render(&self.config.template, arguments)?;
        let metadata = self.metadata.clone();
        Ok(Box::pin(async_stream::stream! {
            // Checked above; the accessor is re-taken here because the stream
            // owns the service handle.
            let Some(completion) = service.as_completion() else {
                return;
            };
            let mut chunks = completion.complete_stream(&prompt, &settings);
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(text) => {
                        yield FunctionResult::new(&metadata)
                            .with_value(Value::String(text));
                    }
                    Err(error) => {
                        yield FunctionResult::from_error(&metadata, error);
                        break;
                    }
                }
            }
        }))
    }
}
