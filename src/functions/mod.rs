//! Kernel functions: the polymorphic unit of work.
//!
//! A [`KernelFunction`] is either *native* (wrapping an existing callable,
//! see [`KernelFunctionFromMethod`]) or *templated* (wrapping a prompt
//! template plus a target service, see [`KernelFunctionFromPrompt`]). Both
//! expose the same `invoke` / `invoke_stream` contract, so the engine and the
//! event pipeline never care which variant they are driving.

pub mod binder;
pub mod metadata;
mod native;
mod prompt;
mod result;

pub use binder::{BoundArguments, InvocationContext};
pub use metadata::{KernelFunctionMetadata, KernelParameterMetadata, ParameterKind};
pub use native::{BoxError, KernelFunctionFromMethod, NativeOutput};
pub use prompt::{KernelFunctionFromPrompt, PROMPT_KEY, PromptTemplateConfig};
pub use result::{CANCELLED_KEY, FunctionResult, INVOCATION_ID_KEY};

use crate::args::KernelArguments;
use crate::error::KernelResult;
use crate::kernel::Kernel;
use futures::Stream;
use std::pin::Pin;

/// A lazy sequence of partial results.
///
/// Streams do not borrow the function or the argument bag: binding and
/// template rendering happen before the stream is constructed, so a stream
/// can outlive the call that created it.
pub type StreamingFunctionResult = Pin<Box<dyn Stream<Item = FunctionResult> + Send + 'static>>;

/// The uniform invocation contract shared by native and templated functions.
#[async_trait::async_trait]
pub trait KernelFunction: Send + Sync {
    /// Identity, parameters and service configuration of this function.
    fn metadata(&self) -> &KernelFunctionMetadata;

    /// Bind arguments, execute the wrapped logic exactly once, and normalize
    /// the outcome into a single [`FunctionResult`]. An incremental body is
    /// fully drained into an ordered sequence. Failures of the wrapped logic
    /// are captured into the result's exception, never raised; structural
    /// errors (unresolvable service, template syntax) are returned as `Err`.
    async fn invoke(
        &self,
        kernel: &Kernel,
        arguments: &KernelArguments,
    ) -> KernelResult<FunctionResult>;

    /// Produce results incrementally. An incremental body yields each element
    /// as it becomes available; a single-shot body yields exactly one
    /// terminal result carrying a `StreamingNotSupported` exception, so
    /// callers can iterate uniformly without special-casing.
    async fn invoke_stream(
        &self,
        kernel: &Kernel,
        arguments: &KernelArguments,
    ) -> KernelResult<StreamingFunctionResult>;
}
