//! Maestro is an orchestration engine for AI-backed applications: it routes
//! calls to *kernel functions* (native callables and prompt templates under
//! one invocation contract) through pluggable backend services, with an
//! event pipeline that can observe, rewrite, cancel, or repeat every call.
//!
//! The center of the crate is the [`Kernel`]: a plugin registry, a service
//! registry with capability-based selection, a template engine, and the
//! pre/post invocation hooks. Everything else plugs into it:
//!
//! - [`functions`] defines the [`KernelFunction`] contract and its two
//!   implementations, [`KernelFunctionFromMethod`] and
//!   [`KernelFunctionFromPrompt`].
//! - [`services`] defines the [`AiService`] trait, the capability tags, and
//!   the [`ServiceRegistry`] selection rules.
//! - [`events`] defines the handler pipeline around every invocation.
//!
//! ```no_run
//! use maestro::{Kernel, KernelArguments, KernelFunctionFromMethod, KernelFunctionMetadata};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn demo() -> maestro::KernelResult<()> {
//! let mut kernel = Kernel::new();
//! let shout = KernelFunctionFromMethod::from_sync(
//!     KernelFunctionMetadata::new("shout")
//!         .with_parameters([maestro::KernelParameterMetadata::new("input")]),
//!     |context| {
//!         let text: String = context.arguments.get("input")?;
//!         Ok(json!(text.to_uppercase()))
//!     },
//! )?;
//! kernel.add_function("Text", Arc::new(shout))?;
//!
//! let mut args = KernelArguments::new().with_input("hello");
//! let result = kernel.invoke_by_name("Text", "shout", &mut args).await?;
//! assert_eq!(result.to_string(), "HELLO");
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod error;
pub mod events;
pub mod functions;
pub mod kernel;
pub mod memory;
pub mod plugin;
pub mod services;
pub mod template;

pub use args::{INPUT_KEY, KernelArguments};
pub use error::{KernelError, KernelResult};
pub use events::{
    FunctionInvokedArgs, FunctionInvokingArgs, HandlerCollection, HandlerId, InvokedHandler,
    InvokingHandler,
};
pub use functions::{
    BoundArguments, CANCELLED_KEY, FunctionResult, INVOCATION_ID_KEY, InvocationContext,
    KernelFunction, KernelFunctionFromMethod, KernelFunctionFromPrompt, KernelFunctionMetadata,
    KernelParameterMetadata, PROMPT_KEY, ParameterKind, PromptTemplateConfig,
    StreamingFunctionResult,
};
pub use kernel::{Kernel, KernelResultStream};
pub use memory::{InMemoryMemoryStore, MemoryMatch, MemoryRecord, MemoryService};
pub use plugin::{KernelPlugin, KernelPluginCollection};
pub use services::{
    AiService, CompletionService, DEFAULT_SERVICE_ID, PromptExecutionSettings, ServiceCapability,
    ServiceRegistry,
};
pub use template::{BasicTemplateEngine, PromptTemplateEngine};
