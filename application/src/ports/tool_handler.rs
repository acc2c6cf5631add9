//! Tool handler port
//!
//! Defines the interface developer-supplied tools implement, plus the
//! [`ToolRegistration`] that binds a handler to its [`ToolDefinition`].
//!
//! Handlers return `Result<ToolOutput, ToolError>`. [`ToolError`] is opaque:
//! its detail is written to the diagnostic log only, and the model sees a
//! generic failure message.

use async_trait::async_trait;
use harness_domain::{BinaryContent, SessionId, ToolDefinition};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Explicit context passed to every handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub session_id: SessionId,
    pub tool_call_id: String,
    pub tool_name: String,
}

/// Value returned by a successful handler.
///
/// `value` is turned into the model-visible text by the registration's
/// serializer; `binary` travels on the separate binary channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub value: serde_json::Value,
    pub binary: Vec<BinaryContent>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            value: serde_json::Value::String(text.into()),
            binary: Vec::new(),
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self {
            value,
            binary: Vec::new(),
        }
    }

    pub fn with_binary(mut self, binary: BinaryContent) -> Self {
        self.binary.push(binary);
        self
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

/// Opaque handler failure.
///
/// Any `std::error::Error` converts into it, so handlers can use `?`.
/// The detail is only available to diagnostics via [`ToolError::detail`].
pub struct ToolError {
    detail: String,
}

impl ToolError {
    pub fn new(detail: impl std::fmt::Display) -> Self {
        Self {
            detail: detail.to_string(),
        }
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl std::fmt::Debug for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolError")
            .field("detail", &self.detail)
            .finish()
    }
}

impl<E> From<E> for ToolError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::new(err)
    }
}

/// Port for developer-supplied tool implementations.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Extra argument shape check run after descriptor validation and
    /// before permission is acted on. Typed handlers deserialize here.
    fn check_arguments(&self, _arguments: &serde_json::Value) -> Result<(), String> {
        Ok(())
    }

    /// Run the tool.
    async fn call(
        &self,
        invocation: ToolInvocation,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError>;
}

/// Converts a handler's success value into model-visible text.
pub type ResultSerializer = Arc<dyn Fn(&serde_json::Value) -> String + Send + Sync>;

/// Default serialization: strings verbatim, anything else as compact JSON.
pub fn default_serialize(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A tool bound to its handler, fixed for the lifetime of a session.
#[derive(Clone)]
pub struct ToolRegistration {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
    serializer: Option<ResultSerializer>,
}

impl ToolRegistration {
    pub fn new(definition: ToolDefinition, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            definition,
            handler,
            serializer: None,
        }
    }

    /// Register an async closure taking raw JSON arguments.
    pub fn from_fn<F, Fut>(definition: ToolDefinition, f: F) -> Self
    where
        F: Fn(ToolInvocation, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        Self::new(definition, Arc::new(FnHandler { f }))
    }

    /// Register an async closure taking arguments deserialized into `A`.
    ///
    /// A deserialization failure is reported as bad arguments and the
    /// closure is never called.
    pub fn typed<A, F, Fut>(definition: ToolDefinition, f: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        F: Fn(ToolInvocation, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        Self::new(
            definition,
            Arc::new(TypedHandler {
                f,
                _args: PhantomData,
            }),
        )
    }

    pub fn with_serializer<S>(mut self, serializer: S) -> Self
    where
        S: Fn(&serde_json::Value) -> String + Send + Sync + 'static,
    {
        self.serializer = Some(Arc::new(serializer));
        self
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.handler)
    }

    pub fn serialize(&self, value: &serde_json::Value) -> String {
        match &self.serializer {
            Some(serializer) => serializer(value),
            None => default_serialize(value),
        }
    }
}

impl std::fmt::Debug for ToolRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistration")
            .field("name", &self.definition.name)
            .field("custom_serializer", &self.serializer.is_some())
            .finish()
    }
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(ToolInvocation, serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
{
    async fn call(
        &self,
        invocation: ToolInvocation,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        (self.f)(invocation, arguments).await
    }
}

struct TypedHandler<A, F> {
    f: F,
    _args: PhantomData<fn() -> A>,
}

#[async_trait]
impl<A, F, Fut> ToolHandler for TypedHandler<A, F>
where
    A: DeserializeOwned + Send + 'static,
    F: Fn(ToolInvocation, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
{
    fn check_arguments(&self, arguments: &serde_json::Value) -> Result<(), String> {
        serde_json::from_value::<A>(arguments.clone())
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn call(
        &self,
        invocation: ToolInvocation,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let args: A = serde_json::from_value(arguments)?;
        (self.f)(invocation, args).await
    }
}
