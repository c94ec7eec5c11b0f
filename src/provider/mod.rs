//! Completion backend trait and implementations.

pub mod http;

#[cfg(feature = "anthropic")]
pub mod anthropic;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ProbeError;
use crate::types::{Message, Response};

/// Tool definition offered to the model: a named function with a JSON
/// Schema `object` input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A text-completion backend able to drive tool-calling conversations.
///
/// `tools` is empty for pure text generation. Implementations translating to
/// a wire protocol must encode an assistant message with tool calls and no
/// content as a tool-invocation turn, and coalesce consecutive tool messages
/// into one reciprocal turn when the protocol requires alternation.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Backend name used in logs (e.g. "anthropic").
    fn name(&self) -> &str;

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Response, ProbeError>;
}

/// Run one completion, abandoning it as soon as `cancel` fires.
pub(crate) async fn complete_or_cancel(
    backend: &dyn CompletionBackend,
    messages: &[Message],
    tools: &[ToolDefinition],
    cancel: &CancellationToken,
) -> Result<Response, ProbeError> {
    if cancel.is_cancelled() {
        return Err(ProbeError::Canceled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProbeError::Canceled),
        result = backend.complete(messages, tools) => result,
    }
}
