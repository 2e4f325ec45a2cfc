//! The invocation engine: registries, event pipeline, and the `invoke` /
//! `invoke_stream` / `invoke_prompt` entry points.

use crate::args::KernelArguments;
use crate::error::{KernelError, KernelResult};
use crate::events::{
    FunctionInvokedArgs, FunctionInvokingArgs, HandlerCollection, HandlerId, InvokedHandler,
    InvokingHandler,
};
use crate::functions::{
    CANCELLED_KEY, FunctionResult, INVOCATION_ID_KEY, KernelFunction, KernelFunctionFromPrompt,
    KernelFunctionMetadata, PromptTemplateConfig,
};
use crate::plugin::{KernelPlugin, KernelPluginCollection};
use crate::services::{
    AiService, DEFAULT_SERVICE_ID, PromptExecutionSettings, ServiceCapability, ServiceRegistry,
};
use crate::template::{BasicTemplateEngine, PromptTemplateEngine};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

/// A stream of engine-level invocation outcomes. Structural failures surface
/// as `Err` elements; contained failures travel inside the results.
pub type KernelResultStream<'a> =
    Pin<Box<dyn Stream<Item = KernelResult<FunctionResult>> + Send + 'a>>;

/// The central orchestrator: plugin and service registries, the template
/// engine, and the pre/post invocation event pipeline.
///
/// Cloning a kernel is a shallow snapshot: functions, services and the
/// template engine are shared, registry membership is copied. Registries are
/// setup-time state, so a snapshot injected into a running function sees the
/// same plugins and services as its caller.
#[derive(Clone)]
pub struct Kernel {
    plugins: KernelPluginCollection,
    services: ServiceRegistry,
    invoking_handlers: HandlerCollection<InvokingHandler>,
    invoked_handlers: HandlerCollection<InvokedHandler>,
    template_engine: Arc<dyn PromptTemplateEngine>,
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    /// An empty kernel using the built-in `{{$variable}}` template engine.
    pub fn new() -> Self {
        Self::with_template_engine(Arc::new(BasicTemplateEngine))
    }

    pub fn with_template_engine(template_engine: Arc<dyn PromptTemplateEngine>) -> Self {
        Self {
            plugins: KernelPluginCollection::new(),
            services: ServiceRegistry::new(),
            invoking_handlers: HandlerCollection::new(),
            invoked_handlers: HandlerCollection::new(),
            template_engine,
        }
    }

    pub fn template_engine(&self) -> Arc<dyn PromptTemplateEngine> {
        self.template_engine.clone()
    }

    // ---- plugin registry ----------------------------------------------

    /// Register a plugin, rejecting duplicates by name.
    pub fn add_plugin(&mut self, plugin: KernelPlugin) -> KernelResult<()> {
        self.plugins.add(plugin)
    }

    /// Register a single function under a plugin, creating the plugin when it
    /// does not exist yet.
    pub fn add_function(
        &mut self,
        plugin_name: &str,
        function: Arc<dyn KernelFunction>,
    ) -> KernelResult<()> {
        if let Some(plugin) = self.plugins.get_mut(plugin_name) {
            return plugin.add(function);
        }
        let mut plugin = KernelPlugin::new(plugin_name)?;
        plugin.add(function)?;
        self.plugins.add(plugin)
    }

    pub fn get_plugin(&self, plugin_name: &str) -> KernelResult<&KernelPlugin> {
        self.plugins.get(plugin_name)
    }

    pub fn get_function(
        &self,
        plugin_name: &str,
        function_name: &str,
    ) -> KernelResult<Arc<dyn KernelFunction>> {
        self.plugins.get_function(plugin_name, function_name)
    }

    /// Resolve a function from its `Plugin-function` form. A name without a
    /// matching plugin part is searched as a bare function name across every
    /// plugin.
    pub fn get_function_from_fully_qualified_name(
        &self,
        fully_qualified_name: &str,
    ) -> KernelResult<Arc<dyn KernelFunction>> {
        if let Some((plugin_name, function_name)) = fully_qualified_name.split_once('-') {
            if let Ok(function) = self.plugins.get_function(plugin_name, function_name) {
                return Ok(function);
            }
        }
        for plugin in self.plugins.plugins() {
            if let Some(function) = plugin.get(fully_qualified_name) {
                return Ok(function.clone());
            }
        }
        Err(KernelError::FunctionNotFound(
            fully_qualified_name.to_string(),
        ))
    }

    pub fn plugins(&self) -> &KernelPluginCollection {
        &self.plugins
    }

    // ---- service registry ---------------------------------------------

    /// Register a service under its own id, rejecting duplicates.
    pub fn add_service(&mut self, service: Arc<dyn AiService>) -> KernelResult<()> {
        self.services.add(service)
    }

    pub fn remove_service(&mut self, service_id: &str) -> KernelResult<Arc<dyn AiService>> {
        self.services.remove(service_id)
    }

    pub fn remove_all_services(&mut self) {
        self.services.remove_all();
    }

    /// Resolve a service by logical id and/or required capability.
    pub fn get_service(
        &self,
        service_id: Option<&str>,
        required: &[ServiceCapability],
    ) -> KernelResult<Arc<dyn AiService>> {
        self.services.select(service_id, required)
    }

    /// Every registered service satisfying one of the capabilities.
    pub fn get_services_by_type(
        &self,
        required: &[ServiceCapability],
    ) -> HashMap<String, Arc<dyn AiService>> {
        self.services.get_all_of_type(required)
    }

    /// The execution settings a registered service would default to.
    pub fn execution_settings_from_service_id(
        &self,
        service_id: &str,
    ) -> KernelResult<PromptExecutionSettings> {
        self.services.execution_settings(service_id)
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Pick the service (and effective settings) for one invocation.
    ///
    /// Candidate service ids are tried in precedence order: ids named by the
    /// caller's attached execution settings, then ids configured on the
    /// function, then the function's default service id. The first candidate
    /// the registry can satisfy wins; when no candidate resolves, selection
    /// falls back to the registry's default rules. The effective settings are
    /// layered provider defaults, then function-configured settings, then
    /// caller settings, with later layers winning key by key.
    pub(crate) fn resolve_service_and_settings(
        &self,
        metadata: &KernelFunctionMetadata,
        arguments: &KernelArguments,
        configured: &[(String, PromptExecutionSettings)],
        required: &[ServiceCapability],
    ) -> KernelResult<(Arc<dyn AiService>, PromptExecutionSettings)> {
        let mut candidates: Vec<&str> = Vec::new();
        for (service_id, _) in arguments.execution_settings_iter() {
            if !candidates.contains(&service_id) {
                candidates.push(service_id);
            }
        }
        for (service_id, _) in configured {
            if !candidates.contains(&service_id.as_str()) {
                candidates.push(service_id);
            }
        }
        if let Some(service_id) = &metadata.default_service_id {
            if !candidates.contains(&service_id.as_str()) {
                candidates.push(service_id);
            }
        }

        for service_id in &candidates {
            // The reserved default id is a selection rule, not a registry key.
            let selector = (*service_id != DEFAULT_SERVICE_ID).then_some(*service_id);
            match self.services.select(selector, required) {
                Ok(service) => {
                    let settings = merged_settings(service.as_ref(), configured, arguments);
                    return Ok((service, settings));
                }
                Err(error) => {
                    tracing::trace!(
                        function = %metadata.fully_qualified_name(),
                        service_id = %service_id,
                        error = %error,
                        "service candidate did not resolve"
                    );
                }
            }
        }
        let service = self.services.select(None, required)?;
        let settings = merged_settings(service.as_ref(), configured, arguments);
        Ok((service, settings))
    }

    // ---- event pipeline -----------------------------------------------

    pub fn add_function_invoking_handler(&mut self, handler: InvokingHandler) -> HandlerId {
        self.invoking_handlers.add(handler)
    }

    /// Remove a pre-invocation handler. Removing an absent handle is a no-op.
    pub fn remove_function_invoking_handler(&mut self, id: HandlerId) -> bool {
        self.invoking_handlers.remove(id)
    }

    pub fn add_function_invoked_handler(&mut self, handler: InvokedHandler) -> HandlerId {
        self.invoked_handlers.add(handler)
    }

    /// Remove a post-invocation handler. Removing an absent handle is a no-op.
    pub fn remove_function_invoked_handler(&mut self, id: HandlerId) -> bool {
        self.invoked_handlers.remove(id)
    }

    pub fn function_invoking_handler_count(&self) -> usize {
        self.invoking_handlers.len()
    }

    pub fn function_invoked_handler_count(&self) -> usize {
        self.invoked_handlers.len()
    }

    /// Run the pre-invocation chain against the live argument bag. Returns
    /// whether any handler requested cancellation.
    fn run_invoking_handlers(
        &self,
        metadata: &KernelFunctionMetadata,
        arguments: &mut KernelArguments,
    ) -> bool {
        if self.invoking_handlers.is_empty() {
            return false;
        }
        let mut args = FunctionInvokingArgs::new(metadata, arguments);
        for handler in self.invoking_handlers.iter() {
            handler(&mut args);
        }
        if args.arguments_updated() {
            tracing::debug!(
                function = %metadata.fully_qualified_name(),
                "arguments rewritten by pre-invocation handler"
            );
        }
        args.is_cancel_requested()
    }

    /// Run the post-invocation chain. Returns whether any handler requested a
    /// repeat.
    fn run_invoked_handlers(
        &self,
        metadata: &KernelFunctionMetadata,
        arguments: &mut KernelArguments,
        result: &FunctionResult,
    ) -> bool {
        if self.invoked_handlers.is_empty() {
            return false;
        }
        let mut args = FunctionInvokedArgs::new(metadata, arguments, result);
        for handler in self.invoked_handlers.iter() {
            handler(&mut args);
        }
        if args.arguments_updated() {
            tracing::debug!(
                function = %metadata.fully_qualified_name(),
                "arguments rewritten by post-invocation handler"
            );
        }
        args.is_repeat_requested()
    }

    fn cancellation_result(
        metadata: &KernelFunctionMetadata,
        invocation_id: &str,
    ) -> FunctionResult {
        FunctionResult::from_error(
            metadata,
            KernelError::Cancelled(metadata.fully_qualified_name()),
        )
        .with_metadata(CANCELLED_KEY, Value::Bool(true))
        .with_metadata(INVOCATION_ID_KEY, Value::String(invocation_id.to_string()))
    }

    // ---- invocation ---------------------------------------------------

    /// Route one invocation through the event pipeline.
    ///
    /// Pre-invocation handlers run first and may rewrite the argument bag or
    /// cancel the call; a cancelled call returns a result flagged via
    /// [`CANCELLED_KEY`] without executing the function or the post chain.
    /// After each execution the post-invocation handlers see the result; any
    /// repeat request reruns the function with the current argument bag.
    pub async fn invoke(
        &self,
        function: &dyn KernelFunction,
        arguments: &mut KernelArguments,
    ) -> KernelResult<FunctionResult> {
        let metadata = function.metadata().clone();
        let invocation_id = Uuid::new_v4().to_string();
        tracing::debug!(
            invocation_id = %invocation_id,
            function = %metadata.fully_qualified_name(),
            "invoking function"
        );

        if self.run_invoking_handlers(&metadata, arguments) {
            tracing::debug!(
                invocation_id = %invocation_id,
                function = %metadata.fully_qualified_name(),
                "invocation cancelled by pre-invocation handler"
            );
            return Ok(Self::cancellation_result(&metadata, &invocation_id));
        }

        loop {
            let mut result = function.invoke(self, arguments).await?;
            result.metadata.insert(
                INVOCATION_ID_KEY.to_string(),
                Value::String(invocation_id.clone()),
            );
            if !self.run_invoked_handlers(&metadata, arguments, &result) {
                return Ok(result);
            }
            tracing::debug!(
                invocation_id = %invocation_id,
                function = %metadata.fully_qualified_name(),
                "repeat requested by post-invocation handler"
            );
        }
    }

    /// Resolve a function through the plugin registry and invoke it.
    pub async fn invoke_by_name(
        &self,
        plugin_name: &str,
        function_name: &str,
        arguments: &mut KernelArguments,
    ) -> KernelResult<FunctionResult> {
        let function = self.plugins.get_function(plugin_name, function_name)?;
        self.invoke(function.as_ref(), arguments).await
    }

    /// Route one invocation through the event pipeline, forwarding partial
    /// results as they arrive.
    ///
    /// The pre-invocation chain runs before the first partial; cancellation
    /// yields a single flagged result. Partials are forwarded unchanged (plus
    /// the invocation id) while an aggregate result accumulates their values;
    /// once the function's stream ends, the post-invocation chain runs exactly
    /// once against the aggregate. Repeat requests are ignored on this path:
    /// partials were already delivered, so a rerun cannot be made transparent.
    pub fn invoke_stream<'a>(
        &'a self,
        function: Arc<dyn KernelFunction>,
        arguments: &'a mut KernelArguments,
    ) -> KernelResultStream<'a> {
        Box::pin(async_stream::stream! {
            let metadata = function.metadata().clone();
            let invocation_id = Uuid::new_v4().to_string();
            tracing::debug!(
                invocation_id = %invocation_id,
                function = %metadata.fully_qualified_name(),
                "invoking function (streaming)"
            );

            if self.run_invoking_handlers(&metadata, arguments) {
                yield Ok(Self::cancellation_result(&metadata, &invocation_id));
                return;
            }

            let mut inner = match function.invoke_stream(self, arguments).await {
                Ok(inner) => inner,
                Err(error) => {
                    yield Err(error);
                    return;
                }
            };

            let mut aggregate = FunctionResult::new(&metadata);
            let mut pieces: Vec<Value> = Vec::new();
            while let Some(mut part) = inner.next().await {
                part.metadata.insert(
                    INVOCATION_ID_KEY.to_string(),
                    Value::String(invocation_id.clone()),
                );
                if let Some(value) = &part.value {
                    pieces.push(value.clone());
                }
                if let Some(error) = part.exception() {
                    aggregate = aggregate.with_exception(error.clone());
                }
                yield Ok(part);
            }
            drop(inner);

            aggregate.value = Some(aggregate_value(pieces));
            aggregate.metadata.insert(
                INVOCATION_ID_KEY.to_string(),
                Value::String(invocation_id.clone()),
            );
            self.run_invoked_handlers(&metadata, arguments, &aggregate);
        })
    }

    /// Resolve a function through the plugin registry and stream it.
    pub fn invoke_stream_by_name<'a>(
        &'a self,
        plugin_name: &str,
        function_name: &str,
        arguments: &'a mut KernelArguments,
    ) -> KernelResult<KernelResultStream<'a>> {
        let function = self.plugins.get_function(plugin_name, function_name)?;
        Ok(self.invoke_stream(function, arguments))
    }

    /// Compile a one-off templated function from raw prompt text and invoke
    /// it through the full pipeline. An empty or malformed prompt fails with
    /// `TemplateSyntax` before any handler runs.
    pub async fn invoke_prompt(
        &self,
        prompt: &str,
        plugin_name: Option<&str>,
        function_name: &str,
        arguments: &mut KernelArguments,
    ) -> KernelResult<FunctionResult> {
        let function = KernelFunctionFromPrompt::new(
            function_name,
            plugin_name,
            PromptTemplateConfig::new(prompt),
            self.template_engine.clone(),
        )?;
        self.invoke(&function, arguments).await
    }
}

/// Layer provider defaults, function-configured settings, and caller settings
/// for the resolved service. Entries under the reserved default id apply to
/// whatever service resolves; entries under the service's own id win over
/// them.
fn merged_settings(
    service: &dyn AiService,
    configured: &[(String, PromptExecutionSettings)],
    arguments: &KernelArguments,
) -> PromptExecutionSettings {
    let mut settings = service.execution_settings();
    for key in [DEFAULT_SERVICE_ID, service.service_id()] {
        if let Some((_, entry)) = configured.iter().find(|(id, _)| id == key) {
            settings.merge(entry);
        }
    }
    for key in [DEFAULT_SERVICE_ID, service.service_id()] {
        if let Some(entry) = arguments.execution_settings(key) {
            settings.merge(entry);
        }
    }
    settings.service_id = Some(service.service_id().to_string());
    settings
}

/// Collapse streamed partial values into one aggregate value: text chunks are
/// concatenated, anything else becomes an ordered sequence.
fn aggregate_value(pieces: Vec<Value>) -> Value {
    if !pieces.is_empty() && pieces.iter().all(Value::is_string) {
        let text: String = pieces
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("");
        return Value::String(text);
    }
    Value::Array(pieces)
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("plugin_count", &self.plugins.len())
            .field("service_count", &self.services.len())
            .field("invoking_handlers", &self.invoking_handlers.len())
            .field("invoked_handlers", &self.invoked_handlers.len())
            .finish()
    }
}
