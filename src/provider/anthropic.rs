//! Anthropic Messages API completion backend.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ProbeError;
use crate::types::{Message, Response, Role, ToolCall};
use crate::util::retry::RetryPolicy;

use super::http::{anthropic_headers, shared_client, status_to_error};
use super::{CompletionBackend, ToolDefinition};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicBackend {
    model: String,
    api_key: String,
    base_url: String,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<String>, model: Option<String>, base_url: Option<String>) -> Self {
        Self {
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens: DEFAULT_MAX_TOKENS,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request_body(&self, messages: &[Message], tools: &[ToolDefinition]) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": convert_messages(messages),
        });
        if !tools.is_empty() {
            let tool_defs: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = Value::Array(tool_defs);
        }
        body
    }

    async fn send(&self, body: &Value) -> Result<Response, ProbeError> {
        let url = format!("{}/messages", self.base_url.trim_end_matches('/'));
        let resp = shared_client()
            .post(&url)
            .headers(anthropic_headers(&self.api_key, API_VERSION))
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let data: AnthropicResponse = resp.json().await?;
        Ok(convert_response(data))
    }
}

#[async_trait]
impl CompletionBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Response, ProbeError> {
        let body = self.build_request_body(messages, tools);
        debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "Anthropic complete"
        );
        self.retry.execute(|| self.send(&body)).await
    }
}

/// Translate the conversation into Messages API turns.
///
/// Consecutive tool-role messages become a single user turn of
/// `tool_result` blocks so user/assistant turns keep alternating.
fn convert_messages(messages: &[Message]) -> Vec<Value> {
    let mut turns = Vec::new();
    let mut i = 0;
    while i < messages.len() {
        let msg = &messages[i];
        match msg.role {
            Role::User => {
                turns.push(json!({"role": "user", "content": msg.content}));
                i += 1;
            }
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !msg.content.is_empty() {
                    blocks.push(json!({"type": "text", "text": msg.content}));
                }
                for call in &msg.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": tool_input_value(&call.input),
                    }));
                }
                turns.push(json!({"role": "assistant", "content": blocks}));
                i += 1;
            }
            Role::Tool => {
                let mut blocks = Vec::new();
                while i < messages.len() && messages[i].role == Role::Tool {
                    let result = &messages[i];
                    blocks.push(json!({
                        "type": "tool_result",
                        "tool_use_id": result.tool_call_id.as_deref().unwrap_or_default(),
                        "content": result.content,
                    }));
                    i += 1;
                }
                turns.push(json!({"role": "user", "content": blocks}));
            }
        }
    }
    turns
}

/// `tool_use.input` must be an object; raw text that does not parse to one
/// is sent as an empty object.
fn tool_input_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({}),
    }
}

fn convert_response(data: AnthropicResponse) -> Response {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in data.content {
        match block.r#type.as_str() {
            "text" => {
                if let Some(t) = block.text {
                    text.push_str(&t);
                }
            }
            "tool_use" => {
                if let (Some(id), Some(name)) = (block.id, block.name) {
                    let input = block.input.unwrap_or_else(|| json!({}));
                    tool_calls.push(ToolCall::new(id, name, input.to_string()));
                }
            }
            _ => {}
        }
    }
    Response::from_parts(text, tool_calls)
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}
