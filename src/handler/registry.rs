//! Service registry for dispatching requests by service and operation name.
//!
//! The registry maps a service name to a [`ServiceHandler`]; each handler
//! maps operation names to boxed async functions. Registrations happen at
//! startup and the registry is immutable while serving.
//!
//! Dispatch is an explicit lookup, not reflection: a miss at either level
//! becomes a structured error descriptor carried back to the caller.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{ErrorDescriptor, MsgPackCodec, RequestEnvelope, ResponseEnvelope, WireErrorKind};

/// Outcome of a handler invocation: result bytes, or a failure message that
/// gets packaged into the error response.
pub type OperationResult = Result<Bytes, String>;

/// Boxed future for operation results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An executable operation on a service.
pub trait Operation: Send + Sync + 'static {
    /// Execute the operation with raw argument bytes.
    fn call(&self, args: Bytes) -> BoxFuture<'static, OperationResult>;
}

/// Wrapper that deserializes arguments and serializes the result through the
/// MessagePack codec before and after calling the typed handler.
pub struct TypedOperation<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R, String>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> (R, Fut)>,
}

impl<F, T, R, Fut> TypedOperation<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R, String>> + Send + 'static,
{
    /// Create a new typed operation.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, Fut> Operation for TypedOperation<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R, String>> + Send + 'static,
{
    fn call(&self, args: Bytes) -> BoxFuture<'static, OperationResult> {
        let parsed: T = match MsgPackCodec::decode(&args) {
            Ok(v) => v,
            Err(e) => {
                let message = format!("invalid arguments: {}", e);
                return Box::pin(async move { Err(message) });
            }
        };

        let fut = (self.handler)(parsed);
        Box::pin(async move {
            let result = fut.await?;
            MsgPackCodec::encode(&result)
                .map(Bytes::from)
                .map_err(|e| format!("result encoding failed: {}", e))
        })
    }
}

/// Operation over raw bytes, for callers that manage their own encoding.
struct RawOperation<F>(F);

impl<F, Fut> Operation for RawOperation<F>
where
    F: Fn(Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = OperationResult> + Send + 'static,
{
    fn call(&self, args: Bytes) -> BoxFuture<'static, OperationResult> {
        Box::pin((self.0)(args))
    }
}

/// A named service with its executable operations.
pub struct ServiceHandler {
    name: String,
    operations: HashMap<String, Box<dyn Operation>>,
}

impl ServiceHandler {
    /// Create a service with no operations yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: HashMap::new(),
        }
    }

    /// Register a typed operation (builder style).
    ///
    /// The handler receives deserialized arguments and returns a
    /// serializable result or a failure message.
    pub fn operation<F, T, R, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = Result<R, String>> + Send + 'static,
    {
        self.operations
            .insert(name.to_string(), Box::new(TypedOperation::new(handler)));
        self
    }

    /// Register an operation over raw argument bytes (builder style).
    pub fn operation_raw<F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationResult> + Send + 'static,
    {
        self.operations
            .insert(name.to_string(), Box::new(RawOperation(handler)));
        self
    }

    /// Get the service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up an operation by name.
    pub fn get(&self, operation: &str) -> Option<&dyn Operation> {
        self.operations.get(operation).map(|op| op.as_ref())
    }
}

/// Registry mapping service names to handlers.
///
/// Built before any request is dispatched; read-only afterwards.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<String, ServiceHandler>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    /// Register a service under its own name (builder style).
    pub fn service(mut self, handler: ServiceHandler) -> Self {
        self.services.insert(handler.name().to_string(), handler);
        self
    }

    /// Look up a service by name.
    pub fn get(&self, service: &str) -> Option<&ServiceHandler> {
        self.services.get(service)
    }

    /// Execute a decoded request envelope and produce the response envelope.
    ///
    /// Every outcome is a response: lookup misses and handler failures
    /// become error descriptors rather than surfacing as local errors.
    pub async fn dispatch(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
        let service = match self.get(&envelope.service) {
            Some(s) => s,
            None => {
                return ResponseEnvelope::Err(ErrorDescriptor::new(
                    WireErrorKind::ServiceNotFound,
                    envelope.service,
                ));
            }
        };

        let operation = match service.get(&envelope.operation) {
            Some(op) => op,
            None => {
                return ResponseEnvelope::Err(ErrorDescriptor::new(
                    WireErrorKind::OperationNotFound,
                    format!("{}.{}", envelope.service, envelope.operation),
                ));
            }
        };

        match operation.call(envelope.args).await {
            Ok(result) => ResponseEnvelope::Ok(result),
            Err(message) => {
                ResponseEnvelope::Err(ErrorDescriptor::new(WireErrorKind::Handler, message))
            }
        }
    }
}
