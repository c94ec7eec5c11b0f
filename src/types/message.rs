//! Conversation messages exchanged with a completion backend.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    /// Correlation token assigned by the backend.
    pub id: String,
    pub name: String,
    /// Raw JSON text exactly as issued by the model.
    pub input: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input: input.into(),
        }
    }
}

/// A message in a story conversation.
///
/// `tool_calls` is only populated on assistant messages that invoke tools and
/// `tool_call_id` only on tool messages, where it must match the id of a
/// call in a preceding assistant message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a plain-text assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create an assistant turn that only carries tool invocations.
    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    /// Create a tool result message answering the call with `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: output.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Result of one completion call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// The model produced a final textual answer instead of requesting tools.
    pub done: bool,
}

impl Response {
    /// A final text answer.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            done: true,
        }
    }

    /// Build a response from backend output, deriving `done` from the calls.
    pub fn from_parts(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let done = tool_calls.is_empty();
        Self {
            content: content.into(),
            tool_calls,
            done,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_follows_tool_calls() {
        assert!(Response::from_parts("PASSED", Vec::new()).done);
        let call = ToolCall::new("c1", "http_request", r#"{"method":"GET","path":"/"}"#);
        assert!(!Response::from_parts("", vec![call]).done);
    }

    #[test]
    fn tool_result_carries_correlation_id() {
        let msg = Message::tool_result("c1", r#"{"status":200}"#);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("c1"));
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn role_round_trips_through_strum() {
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!("tool".parse::<Role>().unwrap(), Role::Tool);
    }
}
