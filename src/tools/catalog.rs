//! The fixed tool catalog offered to the model, gated by configured backends.

use strum::{Display, EnumString, IntoStaticStr};

use super::types::ToolParameters;
use crate::provider::ToolDefinition;

/// Names of the tools the executor recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ToolName {
    HttpRequest,
    SqlExec,
    SqlQueryOne,
    SqlQueryAll,
    KafkaAssertCount,
    KafkaAssertContains,
}

/// Which optional backends are configured for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub sql: bool,
    pub message_bus: bool,
}

/// Tool definitions available for `caps`: `http_request` always, the SQL
/// tools only with a SQL backend, the bus assertions only with a bus.
pub fn catalog(caps: Capabilities) -> Vec<ToolDefinition> {
    let mut tools = vec![http_request_tool()];
    if caps.sql {
        tools.extend([sql_exec_tool(), sql_query_one_tool(), sql_query_all_tool()]);
    }
    if caps.message_bus {
        tools.extend([kafka_assert_count_tool(), kafka_assert_contains_tool()]);
    }
    tools
}

fn definition(name: ToolName, description: &str, parameters: ToolParameters) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters: parameters.schema,
    }
}

pub fn http_request_tool() -> ToolDefinition {
    definition(
        ToolName::HttpRequest,
        "Make an HTTP request to the service under test. Returns status code and response body.",
        ToolParameters::object()
            .string("method", "HTTP method: GET, POST, PUT, PATCH, DELETE", true)
            .string("path", "URL path, e.g. /users or /users/1", true)
            .string("body", "JSON body for POST/PUT/PATCH requests, optional", false)
            .build(),
    )
}

fn sql_parameters(query_description: &str) -> ToolParameters {
    ToolParameters::object()
        .string("query", query_description, true)
        .array_or_object(
            "args",
            "Query arguments, optional: an array of values for $1..$n, or an object of values for @name placeholders",
            false,
        )
        .build()
}

pub fn sql_exec_tool() -> ToolDefinition {
    definition(
        ToolName::SqlExec,
        "Execute a SQL statement (INSERT, UPDATE, DELETE, TRUNCATE, CREATE TABLE). Returns rows affected.",
        sql_parameters("SQL statement to execute"),
    )
}

pub fn sql_query_one_tool() -> ToolDefinition {
    definition(
        ToolName::SqlQueryOne,
        "Execute a SQL SELECT and return the first row as a JSON object. Returns {\"error\":\"no rows\"} if nothing found.",
        sql_parameters("SQL SELECT statement"),
    )
}

pub fn sql_query_all_tool() -> ToolDefinition {
    definition(
        ToolName::SqlQueryAll,
        "Execute a SQL SELECT and return all rows as a JSON array of objects.",
        sql_parameters("SQL SELECT statement"),
    )
}

pub fn kafka_assert_count_tool() -> ToolDefinition {
    definition(
        ToolName::KafkaAssertCount,
        "Assert that a Kafka topic contains exactly the expected number of messages.",
        ToolParameters::object()
            .string("topic", "Kafka topic name", true)
            .integer("count", "Expected number of messages", true)
            .build(),
    )
}

pub fn kafka_assert_contains_tool() -> ToolDefinition {
    definition(
        ToolName::KafkaAssertContains,
        "Assert that a Kafka topic contains messages matching a substring. Returns matched count and total.",
        ToolParameters::object()
            .string("topic", "Kafka topic name", true)
            .string("substr", "Substring to search for in message values", true)
            .integer("want_count", "Expected number of matching messages", true)
            .build(),
    )
}
