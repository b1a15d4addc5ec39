use async_trait::async_trait;
use serde::de::DeserializeOwned;
use switchboard_core::{FunctionCall, FunctionResult, FunctionSchema, SchemaError};
use tokio_util::sync::CancellationToken;

/// Per-call state handed to a capability by the conversation loop.
#[derive(Clone, Debug)]
pub struct InvocationContext {
    pub session_id: String,
    pub span: tracing::Span,
    pub cancel: CancellationToken,
}

impl InvocationContext {
    pub fn new(session_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self { session_id: session_id.into(), span: tracing::Span::current(), cancel }
    }

    pub fn detached() -> Self {
        Self::new("detached", CancellationToken::new())
    }
}

/// A capability the model may call by name.
///
/// Implementations report every failure through the returned envelope. The
/// loop forwards the serialized payload to the model either way; a failure
/// envelope is additionally reported to the output as recoverable.
#[async_trait]
pub trait Function: Send + Sync {
    fn name(&self) -> &str;

    fn schema(&self) -> Result<FunctionSchema, SchemaError>;

    async fn invoke(&self, call: &FunctionCall, context: &InvocationContext) -> FunctionResult;
}

/// Decodes the JSON-encoded arguments of `call`. An empty argument string is
/// treated as `{}`.
pub fn decode_arguments<T>(call: &FunctionCall) -> Result<T, FunctionResult>
where
    T: DeserializeOwned,
{
    let raw = call.arguments.trim();
    let raw = if raw.is_empty() { "{}" } else { raw };

    serde_json::from_str(raw).map_err(|error| {
        FunctionResult::error(format!("invalid arguments for `{}`: {error}", call.name))
    })
}
