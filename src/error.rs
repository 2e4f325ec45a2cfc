//! Error types for the orchestration kernel.
//!
//! Structural and setup errors (bad names, duplicate registrations, failed
//! lookups, template syntax) are returned to the caller immediately. Failures
//! raised by a wrapped function body are *contained*: they are captured into
//! the [`FunctionResult`](crate::functions::FunctionResult) so the event
//! pipeline can observe and react to them without aborting the call.

use thiserror::Error;

/// Errors produced by the kernel, its registries and its functions.
///
/// The enum is `Clone` (all payloads are strings) so a captured failure can be
/// stored inside a `FunctionResult` and inspected by event handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    /// Function lookup failed within an existing plugin.
    #[error("FunctionNotFound: function '{0}' is not registered")]
    FunctionNotFound(String),

    /// Plugin lookup failed.
    #[error("PluginNotFound: plugin '{0}' is not registered")]
    PluginNotFound(String),

    /// A plugin or function with the same name is already registered.
    #[error("FunctionAlreadyExists: {0}")]
    FunctionAlreadyExists(String),

    /// A function could not be constructed (invalid name, bad parameter list).
    #[error("FunctionInitialization: {0}")]
    FunctionInitialization(String),

    /// A required parameter had no supplied value and no default.
    #[error("MissingRequiredParameter: parameter '{0}' has no value and no default")]
    MissingRequiredParameter(String),

    /// A supplied value could not be converted into the declared structured type.
    #[error("ParameterCoercion: {0}")]
    ParameterCoercion(String),

    /// A prompt template is empty or syntactically invalid.
    #[error("TemplateSyntax: {0}")]
    TemplateSyntax(String),

    /// No service matched the requested id or capability.
    #[error("ServiceNotFound: {0}")]
    ServiceNotFound(String),

    /// A service with the same id is already registered.
    #[error("DuplicateService: service '{0}' is already registered")]
    DuplicateService(String),

    /// A service was found but does not satisfy the required capability.
    #[error("InvalidServiceType: {0}")]
    InvalidServiceType(String),

    /// A pre-invocation handler cancelled the call before execution.
    #[error("Cancelled: invocation of '{0}' was cancelled before execution")]
    Cancelled(String),

    /// The function body is not an incremental producer.
    #[error("StreamingNotSupported: function '{0}' does not produce incremental results")]
    StreamingNotSupported(String),

    /// The wrapped function body failed while executing.
    #[error("FunctionExecution: {0}")]
    FunctionExecution(String),
}

/// Result type used across the kernel.
pub type KernelResult<T> = Result<T, KernelError>;

impl KernelError {
    /// Whether the error is contained into a `FunctionResult` instead of being
    /// propagated past the invocation boundary.
    pub fn is_contained(&self) -> bool {
        matches!(
            self,
            KernelError::MissingRequiredParameter(_)
                | KernelError::ParameterCoercion(_)
                | KernelError::Cancelled(_)
                | KernelError::StreamingNotSupported(_)
                | KernelError::FunctionExecution(_)
        )
    }
}
