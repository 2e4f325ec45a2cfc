//! Native kernel functions: wrappers around existing callables.

use crate::args::KernelArguments;
use crate::error::{KernelError, KernelResult};
use crate::functions::binder::{InvocationContext, bind};
use crate::functions::metadata::KernelFunctionMetadata;
use crate::functions::result::FunctionResult;
use crate::functions::{KernelFunction, StreamingFunctionResult};
use crate::kernel::Kernel;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{Future, Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;

/// Error type a wrapped callable may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a wrapped callable (or of one element of an incremental one).
pub type NativeOutput = Result<Value, BoxError>;

/// The execution strategy of a native function, tagged explicitly at
/// registration time.
enum NativeBody {
    Sync(Arc<dyn Fn(InvocationContext) -> NativeOutput + Send + Sync>),
    Async(Arc<dyn Fn(InvocationContext) -> BoxFuture<'static, NativeOutput> + Send + Sync>),
    Stream(Arc<dyn Fn(InvocationContext) -> BoxStream<'static, NativeOutput> + Send + Sync>),
}

/// A kernel function wrapping a native callable.
///
/// Built from a synchronous closure, an async closure, or a stream producer;
/// the variant decides how `invoke` drains the body and whether
/// `invoke_stream` produces real increments.
pub struct KernelFunctionFromMethod {
    metadata: KernelFunctionMetadata,
    body: NativeBody,
}

impl KernelFunctionFromMethod {
    /// Wrap a synchronous callable.
    pub fn from_sync<F>(metadata: KernelFunctionMetadata, body: F) -> KernelResult<Self>
    where
        F: Fn(InvocationContext) -> NativeOutput + Send + Sync + 'static,
    {
        metadata.validate()?;
        Ok(Self {
            metadata,
            body: NativeBody::Sync(Arc::new(body)),
        })
    }

    /// Wrap an asynchronous callable.
    pub fn from_async<F, Fut>(metadata: KernelFunctionMetadata, body: F) -> KernelResult<Self>
    where
        F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = NativeOutput> + Send + 'static,
    {
        metadata.validate()?;
        let body = Arc::new(move |context| -> BoxFuture<'static, NativeOutput> {
            Box::pin(body(context))
        });
        Ok(Self {
            metadata,
            body: NativeBody::Async(body),
        })
    }

    /// Wrap an incremental producer. `invoke` drains it into an ordered
    /// sequence; `invoke_stream` forwards each element as it arrives.
    pub fn from_stream<F, S>(metadata: KernelFunctionMetadata, body: F) -> KernelResult<Self>
    where
        F: Fn(InvocationContext) -> S + Send + Sync + 'static,
        S: Stream<Item = NativeOutput> + Send + 'static,
    {
        metadata.validate()?;
        let body = Arc::new(move |context| -> BoxStream<'static, NativeOutput> {
            Box::pin(body(context))
        });
        Ok(Self {
            metadata,
            body: NativeBody::Stream(body),
        })
    }

    fn bind_contained(
        &self,
        kernel: &Kernel,
        arguments: &KernelArguments,
    ) -> KernelResult<Result<InvocationContext, FunctionResult>> {
        match bind(&self.metadata, kernel, arguments) {
            Ok(context) => Ok(Ok(context)),
            Err(error) if error.is_contained() => {
                Ok(Err(FunctionResult::from_error(&self.metadata, error)))
            }
            Err(error) => Err(error),
        }
    }
}

#[async_trait::async_trait]
impl KernelFunction for KernelFunctionFromMethod {
    fn metadata(&self) -> &KernelFunctionMetadata {
        &self.metadata
    }

    async fn invoke(
        &self,
        kernel: &Kernel,
        arguments: &KernelArguments,
    ) -> KernelResult<FunctionResult> {
        let context = match self.bind_contained(kernel, arguments)? {
            Ok(context) => context,
            Err(result) => return Ok(result),
        };
        let outcome = match &self.body {
            NativeBody::Sync(body) => body(context),
            NativeBody::Async(body) => body(context).await,
            NativeBody::Stream(body) => {
                let mut stream = body(context);
                let mut items = Vec::new();
                let mut failure = None;
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(value) => items.push(value),
                        Err(error) => {
                            failure = Some(error);
                            break;
                        }
                    }
                }
                match failure {
                    Some(error) => Err(error),
                    None => Ok(Value::Array(items)),
                }
            }
        };
        match outcome {
            Ok(value) => Ok(FunctionResult::new(&self.metadata).with_value(value)),
            Err(error) => {
                tracing::warn!(
                    function = %self.metadata.fully_qualified_name(),
                    error = %error,
                    "function body failed"
                );
                Ok(FunctionResult::from_error(
                    &self.metadata,
                    KernelError::FunctionExecution(error.to_string()),
                ))
            }
        }
    }

    async fn invoke_stream(
        &self,
        kernel: &Kernel,
        arguments: &KernelArguments,
    ) -> KernelResult<StreamingFunctionResult> {
        let context = match self.bind_contained(kernel, arguments)? {
            Ok(context) => context,
            Err(result) => return Ok(Box::pin(futures::stream::iter([result]))),
        };
        match &self.body {
            NativeBody::Stream(body) => {
                let inner = body(context);
                let metadata = self.metadata.clone();
                Ok(Box::pin(async_stream::stream! {
                    let mut inner = inner;
                    while let Some(item) = inner.next().await {
                        match item {
                            Ok(value) => {
                                yield FunctionResult::new(&metadata).with_value(value);
                            }
                            Err(error) => {
                                yield FunctionResult::from_error(
                                    &metadata,
                                    KernelError::FunctionExecution(error.to_string()),
                                );
                                break;
                            }
                        }
                    }
                }))
            }
            // Single-shot bodies are not executed on the streaming path; the
            // stream contract still holds by yielding one terminal element.
            NativeBody::Sync(_) | NativeBody::Async(_) => {
                let result = FunctionResult::from_error(
                    &self.metadata,
                    KernelError::StreamingNotSupported(self.metadata.fully_qualified_name()),
                );
                Ok(Box::pin(futures::stream::iter([result])))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::metadata::KernelParameterMetadata;
    use serde_json::json;

    fn adder() -> KernelFunctionFromMethod {
        KernelFunctionFromMethod::from_sync(
            KernelFunctionMetadata::new("add").with_parameters([
                KernelParameterMetadata::new("x").with_type_tag("integer"),
                KernelParameterMetadata::new("y").with_type_tag("integer"),
            ]),
            |context| {
                let x: i64 = context.arguments.get("x")?;
                let y: i64 = context.arguments.get("y")?;
                Ok(json!(x + y))
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn sync_invoke_round_trips_the_callable() {
        let kernel = Kernel::new();
        let args = KernelArguments::new().with("x", 2).with("y", 40);
        let result = adder().invoke(&kernel, &args).await.unwrap();
        assert_eq!(result.value, Some(json!(42)));
        assert!(result.exception().is_none());
    }

    #[tokio::test]
    async fn async_invoke_works() {
        let function = KernelFunctionFromMethod::from_async(
            KernelFunctionMetadata::new("shout")
                .with_parameters([KernelParameterMetadata::new("input")]),
            |context| async move {
                let text: String = context.arguments.get("input")?;
                Ok(json!(text.to_uppercase()))
            },
        )
        .unwrap();
        let kernel = Kernel::new();
        let args = KernelArguments::new().with_input("quiet");
        let result = function.invoke(&kernel, &args).await.unwrap();
        assert_eq!(result.value, Some(json!("QUIET")));
    }

    #[tokio::test]
    async fn missing_required_parameter_is_contained_not_raised() {
        let kernel = Kernel::new();
        let result = adder().invoke(&kernel, &KernelArguments::new()).await.unwrap();
        assert!(matches!(
            result.exception(),
            Some(KernelError::MissingRequiredParameter(name)) if name == "x"
        ));
    }

    #[tokio::test]
    async fn body_failure_is_contained() {
        let function = KernelFunctionFromMethod::from_sync(
            KernelFunctionMetadata::new("boom"),
            |_context| Err("exploded".into()),
        )
        .unwrap();
        let kernel = Kernel::new();
        let result = function.invoke(&kernel, &KernelArguments::new()).await.unwrap();
        assert!(matches!(
            result.exception(),
            Some(KernelError::FunctionExecution(message)) if message.contains("exploded")
        ));
    }

    #[tokio::test]
    async fn invalid_name_fails_construction() {
        let err = KernelFunctionFromMethod::from_sync(
            KernelFunctionMetadata::new("bad name"),
            |_context| Ok(Value::Null),
        )
        .err()
        .unwrap();
        assert!(matches!(err, KernelError::FunctionInitialization(_)));
    }

    fn counter() -> KernelFunctionFromMethod {
        KernelFunctionFromMethod::from_stream(KernelFunctionMetadata::new("count"), |_context| {
            futures::stream::iter((1..=3).map(|n| Ok(json!(n))))
        })
        .unwrap()
    }

    #[tokio::test]
    async fn invoke_drains_an_incremental_body() {
        let kernel = Kernel::new();
        let result = counter().invoke(&kernel, &KernelArguments::new()).await.unwrap();
        assert_eq!(result.value, Some(json!([1, 2, 3])));
    }

    #[tokio::test]
    async fn invoke_stream_yields_each_element() {
        let kernel = Kernel::new();
        let function = counter();
        let stream = function
            .invoke_stream(&kernel, &KernelArguments::new())
            .await
            .unwrap();
        let parts: Vec<FunctionResult> = stream.collect().await;
        let values: Vec<&Value> = parts.iter().filter_map(|part| part.value.as_ref()).collect();
        assert_eq!(values, vec![&json!(1), &json!(2), &json!(3)]);
    }

    #[tokio::test]
    async fn streaming_a_single_shot_body_yields_one_marked_result() {
        let kernel = Kernel::new();
        let function = adder();
        let args = KernelArguments::new().with("x", 1).with("y", 2);
        let stream = function.invoke_stream(&kernel, &args).await.unwrap();
        let parts: Vec<FunctionResult> = stream.collect().await;
        assert_eq!(parts.len(), 1);
        assert!(matches!(
            parts[0].exception(),
            Some(KernelError::StreamingNotSupported(_))
        ));
    }
}
