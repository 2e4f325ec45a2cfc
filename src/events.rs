//! The invocation event pipeline: hooks that observe and steer every call
//! routed through the engine.
//!
//! Pre-invocation handlers can cancel the call or rewrite its arguments;
//! post-invocation handlers see the result and can request a repeat. Handlers
//! run in registration order and are identified by an opaque [`HandlerId`],
//! so removal is explicit and idempotent.

use crate::args::KernelArguments;
use crate::functions::{FunctionResult, KernelFunctionMetadata};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Event payload seen by pre-invocation handlers.
pub struct FunctionInvokingArgs<'a> {
    pub function: &'a KernelFunctionMetadata,
    pub arguments: &'a mut KernelArguments,
    cancel: bool,
    updated_arguments: bool,
}

impl<'a> FunctionInvokingArgs<'a> {
    pub(crate) fn new(
        function: &'a KernelFunctionMetadata,
        arguments: &'a mut KernelArguments,
    ) -> Self {
        Self {
            function,
            arguments,
            cancel: false,
            updated_arguments: false,
        }
    }

    /// Ask the engine to skip this invocation. Once requested, cancellation
    /// sticks for the rest of the pre-invocation chain.
    pub fn cancel(&mut self) {
        self.cancel = true;
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel
    }

    /// Signal that `arguments` was mutated and the rewritten bag should be
    /// used for the invocation.
    pub fn mark_arguments_updated(&mut self) {
        self.updated_arguments = true;
    }

    pub(crate) fn arguments_updated(&self) -> bool {
        self.updated_arguments
    }
}

/// Event payload seen by post-invocation handlers.
pub struct FunctionInvokedArgs<'a> {
    pub function: &'a KernelFunctionMetadata,
    pub arguments: &'a mut KernelArguments,
    pub result: &'a FunctionResult,
    repeat: bool,
    updated_arguments: bool,
}

impl<'a> FunctionInvokedArgs<'a> {
    pub(crate) fn new(
        function: &'a KernelFunctionMetadata,
        arguments: &'a mut KernelArguments,
        result: &'a FunctionResult,
    ) -> Self {
        Self {
            function,
            arguments,
            result,
            repeat: false,
            updated_arguments: false,
        }
    }

    /// Ask the engine to run the function again after this handler chain
    /// finishes. A repeated execution re-binds against the current argument
    /// bag, so rewrites made here are visible to the next run.
    pub fn repeat(&mut self) {
        self.repeat = true;
    }

    pub fn is_repeat_requested(&self) -> bool {
        self.repeat
    }

    /// Signal that `arguments` was mutated and the rewritten bag should be
    /// used for any repeated execution.
    pub fn mark_arguments_updated(&mut self) {
        self.updated_arguments = true;
    }

    pub(crate) fn arguments_updated(&self) -> bool {
        self.updated_arguments
    }
}

/// Handler invoked before a function executes.
pub type InvokingHandler = Arc<dyn Fn(&mut FunctionInvokingArgs) + Send + Sync>;

/// Handler invoked after a function executes.
pub type InvokedHandler = Arc<dyn Fn(&mut FunctionInvokedArgs) + Send + Sync>;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle returned at handler registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// An ordered set of event handlers.
#[derive(Clone, Default)]
pub struct HandlerCollection<H> {
    handlers: Vec<(HandlerId, H)>,
}

impl<H> HandlerCollection<H> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn add(&mut self, handler: H) -> HandlerId {
        let id = HandlerId::next();
        self.handlers.push((id, handler));
        id
    }

    /// Remove a handler by its handle. Removing an absent handle is a no-op.
    pub fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, _)| *handler_id != id);
        self.handlers.len() != before
    }

    /// Handlers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &H> {
        self.handlers.iter().map(|(_, handler)| handler)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn handlers_run_in_registration_order() {
        let mut collection: HandlerCollection<InvokingHandler> = HandlerCollection::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            let seen = seen.clone();
            collection.add(Arc::new(move |_args: &mut FunctionInvokingArgs| {
                seen.lock().unwrap().push(label);
            }));
        }

        let metadata = KernelFunctionMetadata::new("f");
        let mut arguments = KernelArguments::new();
        let mut args = FunctionInvokingArgs::new(&metadata, &mut arguments);
        for handler in collection.iter() {
            handler(&mut args);
        }
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut collection: HandlerCollection<InvokedHandler> = HandlerCollection::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_handler = calls.clone();
        let id = collection.add(Arc::new(move |_args: &mut FunctionInvokedArgs| {
            calls_in_handler.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(collection.remove(id));
        assert!(!collection.remove(id));
        assert!(collection.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancellation_sticks() {
        let metadata = KernelFunctionMetadata::new("f");
        let mut arguments = KernelArguments::new();
        let mut args = FunctionInvokingArgs::new(&metadata, &mut arguments);
        args.cancel();
        args.cancel();
        assert!(args.is_cancel_requested());
    }
}
