//! Dispatches model tool calls to the configured backends.
//!
//! [`ToolExecutor::execute`] never fails: every outcome, including bad input
//! and backend errors, is rendered as JSON text and handed back to the model.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::bus::{read_snapshot, DEFAULT_BUS_READ_TIMEOUT};
use super::catalog::{catalog, Capabilities, ToolName};
use crate::backends::{HttpBackend, HttpMethod, MessageBus, SqlArgs, SqlBackend};
use crate::error::ProbeError;
use crate::provider::ToolDefinition;
use crate::types::{StepResult, ToolCall};

/// Failures reported back to the model as `{"error": ...}`.
#[derive(Debug, thiserror::Error)]
enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid input: {0}")]
    InvalidInput(#[from] serde_json::Error),

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("{0} not configured")]
    NotConfigured(&'static str),

    #[error("no rows")]
    NoRows,

    #[error(transparent)]
    Backend(#[from] ProbeError),
}

#[derive(Deserialize)]
struct HttpInput {
    method: String,
    path: String,
    #[serde(default)]
    body: Option<Value>,
}

#[derive(Deserialize)]
struct SqlInput {
    query: String,
    #[serde(default)]
    args: Option<SqlArgs>,
}

#[derive(Deserialize)]
struct CountInput {
    topic: String,
    count: i64,
}

#[derive(Deserialize)]
struct ContainsInput {
    topic: String,
    substr: String,
    want_count: i64,
}

/// Runs tool calls against the service under test and its backing stores.
#[derive(Clone)]
pub struct ToolExecutor {
    http: Arc<dyn HttpBackend>,
    sql: Option<Arc<dyn SqlBackend>>,
    bus: Option<Arc<dyn MessageBus>>,
    bus_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(http: Arc<dyn HttpBackend>) -> Self {
        Self {
            http,
            sql: None,
            bus: None,
            bus_timeout: DEFAULT_BUS_READ_TIMEOUT,
        }
    }

    pub fn with_sql(mut self, sql: Option<Arc<dyn SqlBackend>>) -> Self {
        self.sql = sql;
        self
    }

    pub fn with_message_bus(mut self, bus: Option<Arc<dyn MessageBus>>) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_bus_timeout(mut self, timeout: Duration) -> Self {
        self.bus_timeout = timeout;
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            sql: self.sql.is_some(),
            message_bus: self.bus.is_some(),
        }
    }

    /// The tool catalog matching the configured backends.
    pub fn tools(&self) -> Vec<ToolDefinition> {
        catalog(self.capabilities())
    }

    /// Execute one call, pairing its name and raw input with the JSON output.
    pub async fn execute(&self, call: &ToolCall) -> StepResult {
        let output = match self.dispatch(call).await {
            Ok(value) => value.to_string(),
            Err(err) => {
                debug!(tool = %call.name, error = %err, "tool call failed");
                json!({ "error": err.to_string() }).to_string()
            }
        };
        StepResult {
            tool: call.name.clone(),
            input: call.input.clone(),
            output,
        }
    }

    async fn dispatch(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let name: ToolName = call
            .name
            .parse()
            .map_err(|_| ToolError::UnknownTool(call.name.clone()))?;
        let input = call.input.as_str();
        match name {
            ToolName::HttpRequest => self.http_request(serde_json::from_str(input)?).await,
            ToolName::SqlExec => {
                let sql = self.sql()?;
                let (query, args) = sql_input(input)?;
                let rows_affected = sql.exec(&query, &args).await?;
                Ok(json!({ "rows_affected": rows_affected }))
            }
            ToolName::SqlQueryOne => {
                let sql = self.sql()?;
                let (query, args) = sql_input(input)?;
                let row = sql.query_one(&query, &args).await?.ok_or(ToolError::NoRows)?;
                Ok(Value::Object(row))
            }
            ToolName::SqlQueryAll => {
                let sql = self.sql()?;
                let (query, args) = sql_input(input)?;
                let rows = sql.query_all(&query, &args).await?;
                Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
            }
            ToolName::KafkaAssertCount => {
                let bus = self.bus()?;
                let input: CountInput = serde_json::from_str(input)?;
                let messages = read_snapshot(bus, &input.topic, self.bus_timeout).await?;
                let total = messages.len() as i64;
                if total == input.count {
                    return Ok(json!({ "ok": true, "total": total }));
                }
                Ok(json!({
                    "ok": false,
                    "expected": input.count,
                    "actual": total,
                    "messages": as_text(&messages),
                }))
            }
            ToolName::KafkaAssertContains => {
                let bus = self.bus()?;
                let input: ContainsInput = serde_json::from_str(input)?;
                let messages = read_snapshot(bus, &input.topic, self.bus_timeout).await?;
                let texts = as_text(&messages);
                let matched = texts.iter().filter(|m| m.contains(&input.substr)).count() as i64;
                if matched == input.want_count {
                    return Ok(json!({ "ok": true, "matched": matched, "total": texts.len() }));
                }
                Ok(json!({
                    "ok": false,
                    "matched": matched,
                    "total": texts.len(),
                    "messages": texts,
                }))
            }
        }
    }

    async fn http_request(&self, input: HttpInput) -> Result<Value, ToolError> {
        let method: HttpMethod = input
            .method
            .parse()
            .map_err(|_| ToolError::UnsupportedMethod(input.method.clone()))?;
        let body = match input.body {
            Some(Value::Null) | None => None,
            Some(Value::String(text)) if text.is_empty() => None,
            // String bodies are sent as JSON when they parse, verbatim otherwise.
            Some(Value::String(text)) => {
                Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
            }
            Some(other) => Some(other),
        };
        let body = body.filter(|_| method.has_body());

        let reply = self.http.send(method, &input.path, body.as_ref()).await?;
        let body = serde_json::from_slice::<Value>(&reply.body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&reply.body).into_owned()));
        Ok(json!({ "status": reply.status, "body": body }))
    }

    fn sql(&self) -> Result<&dyn SqlBackend, ToolError> {
        self.sql.as_deref().ok_or(ToolError::NotConfigured("postgres"))
    }

    fn bus(&self) -> Result<&dyn MessageBus, ToolError> {
        self.bus.as_deref().ok_or(ToolError::NotConfigured("kafka"))
    }
}

fn sql_input(raw: &str) -> Result<(String, SqlArgs), ToolError> {
    let input: SqlInput = serde_json::from_str(raw)?;
    Ok((input.query, input.args.unwrap_or_default()))
}

fn as_text(messages: &[Vec<u8>]) -> Vec<String> {
    messages
        .iter()
        .map(|m| String::from_utf8_lossy(m).into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::HttpReply;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct Teapot;

    #[async_trait]
    impl HttpBackend for Teapot {
        async fn send(
            &self,
            _method: HttpMethod,
            _path: &str,
            _body: Option<&Value>,
        ) -> Result<HttpReply, ProbeError> {
            Ok(HttpReply {
                status: 418,
                body: b"short and stout".to_vec(),
            })
        }
    }

    fn executor() -> ToolExecutor {
        ToolExecutor::new(Arc::new(Teapot))
    }

    async fn output(call: ToolCall) -> Value {
        let step = executor().execute(&call).await;
        serde_json::from_str(&step.output).unwrap()
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_as_error_json() {
        let out = output(ToolCall::new("1", "shell", "{}")).await;
        assert_eq!(out, json!({"error": "unknown tool: shell"}));
    }

    #[tokio::test]
    async fn bad_input_is_reported_as_error_json() {
        let out = output(ToolCall::new("1", "http_request", "not json")).await;
        assert!(out["error"].as_str().unwrap().starts_with("invalid input: "));
    }

    #[tokio::test]
    async fn unsupported_method_is_rejected() {
        let out = output(ToolCall::new(
            "1",
            "http_request",
            r#"{"method":"TRACE","path":"/"}"#,
        ))
        .await;
        assert_eq!(out, json!({"error": "unsupported method: TRACE"}));
    }

    #[tokio::test]
    async fn non_json_response_body_falls_back_to_text() {
        let step = executor()
            .execute(&ToolCall::new("1", "http_request", r#"{"method":"get","path":"/pot"}"#))
            .await;
        assert_eq!(step.tool, "http_request");
        assert_eq!(step.input, r#"{"method":"get","path":"/pot"}"#);
        let out: Value = serde_json::from_str(&step.output).unwrap();
        assert_eq!(out, json!({"status": 418, "body": "short and stout"}));
    }

    #[tokio::test]
    async fn unconfigured_backends_are_reported() {
        let out = output(ToolCall::new("1", "sql_exec", r#"{"query":"TRUNCATE users"}"#)).await;
        assert_eq!(out, json!({"error": "postgres not configured"}));
        let out = output(ToolCall::new("1", "kafka_assert_count", r#"{"topic":"t","count":1}"#)).await;
        assert_eq!(out, json!({"error": "kafka not configured"}));
        assert_eq!(executor().capabilities(), Capabilities::default());
    }
}
