//! Tool execution against in-memory backends.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use common::{arc, tool_call, FakeBus, FakeSql, RecordingHttp};
use storyprobe::backends::{HttpMethod, SqlArgs};
use storyprobe::tools::ToolExecutor;

async fn output(executor: &ToolExecutor, name: &str, input: Value) -> Value {
    let step = executor.execute(&tool_call("c1", name, input)).await;
    assert_eq!(step.tool, name);
    serde_json::from_str(&step.output).unwrap()
}

fn with_sql(sql: Arc<FakeSql>) -> ToolExecutor {
    ToolExecutor::new(arc(RecordingHttp::new())).with_sql(Some(sql))
}

fn with_bus(bus: FakeBus) -> ToolExecutor {
    ToolExecutor::new(arc(RecordingHttp::new())).with_message_bus(Some(arc(bus)))
}

#[tokio::test]
async fn http_body_rules() {
    let http = arc(RecordingHttp::new().reply(201, r#"{"id":1}"#));
    let executor = ToolExecutor::new(http.clone());

    let out = output(
        &executor,
        "http_request",
        json!({"method": "post", "path": "/users", "body": "{\"name\":\"alice\"}"}),
    )
    .await;
    assert_eq!(out, json!({"status": 201, "body": {"id": 1}}));

    output(
        &executor,
        "http_request",
        json!({"method": "PUT", "path": "/users/1", "body": "plain text"}),
    )
    .await;
    output(
        &executor,
        "http_request",
        json!({"method": "GET", "path": "/users", "body": {"ignored": true}}),
    )
    .await;
    output(
        &executor,
        "http_request",
        json!({"method": "PATCH", "path": "/users/1", "body": ""}),
    )
    .await;

    assert_eq!(
        http.recorded(),
        vec![
            (HttpMethod::Post, "/users".to_string(), Some(json!({"name": "alice"}))),
            (HttpMethod::Put, "/users/1".to_string(), Some(json!("plain text"))),
            (HttpMethod::Get, "/users".to_string(), None),
            (HttpMethod::Patch, "/users/1".to_string(), None),
        ]
    );
}

#[tokio::test]
async fn http_transport_errors_become_error_json() {
    let http = arc(RecordingHttp::new().fail(storyprobe::error::ProbeError::Timeout(30_000)));
    let executor = ToolExecutor::new(http);
    let out = output(&executor, "http_request", json!({"method": "GET", "path": "/"})).await;
    assert_eq!(out, json!({"error": "Timeout after 30000ms"}));
}

#[tokio::test]
async fn sql_exec_reports_rows_affected() {
    let sql = arc(FakeSql {
        rows_affected: 3,
        ..Default::default()
    });
    let executor = with_sql(sql.clone());
    let out = output(&executor, "sql_exec", json!({"query": "TRUNCATE users"})).await;
    assert_eq!(out, json!({"rows_affected": 3}));

    let statements = sql.statements.lock().unwrap().clone();
    assert_eq!(statements, vec![("TRUNCATE users".to_string(), SqlArgs::default())]);
}

#[tokio::test]
async fn sql_query_one_returns_the_row_or_no_rows() {
    let executor = with_sql(arc(FakeSql::with_rows(vec![json!({"id": 1, "name": "alice"})])));
    let out = output(
        &executor,
        "sql_query_one",
        json!({"query": "SELECT * FROM users WHERE name = @name", "args": {"name": "alice"}}),
    )
    .await;
    assert_eq!(out, json!({"id": 1, "name": "alice"}));

    let empty = with_sql(arc(FakeSql::default()));
    let out = output(&empty, "sql_query_one", json!({"query": "SELECT 1"})).await;
    assert_eq!(out, json!({"error": "no rows"}));
}

#[tokio::test]
async fn sql_args_are_forwarded_as_given() {
    let sql = arc(FakeSql::default());
    let executor = with_sql(sql.clone());
    output(
        &executor,
        "sql_query_all",
        json!({"query": "SELECT * FROM users WHERE id = $1", "args": [7]}),
    )
    .await;
    output(
        &executor,
        "sql_query_all",
        json!({"query": "SELECT * FROM users WHERE id = @id", "args": {"id": 7}}),
    )
    .await;

    let statements = sql.statements.lock().unwrap().clone();
    assert_eq!(statements[0].1, SqlArgs::Positional(vec![json!(7)]));
    assert!(matches!(&statements[1].1, SqlArgs::Named(m) if m["id"] == json!(7)));
}

#[tokio::test]
async fn sql_query_all_returns_an_array() {
    let executor = with_sql(arc(FakeSql::with_rows(vec![json!({"id": 1}), json!({"id": 2})])));
    let out = output(&executor, "sql_query_all", json!({"query": "SELECT id FROM users"})).await;
    assert_eq!(out, json!([{"id": 1}, {"id": 2}]));
}

#[tokio::test]
async fn sql_errors_become_error_json() {
    let executor = with_sql(arc(FakeSql {
        error: Some("relation \"nope\" does not exist".into()),
        ..Default::default()
    }));
    let out = output(&executor, "sql_exec", json!({"query": "DELETE FROM nope"})).await;
    assert_eq!(
        out,
        json!({"error": "SQL error: relation \"nope\" does not exist"})
    );
}

#[tokio::test]
async fn kafka_count_matches_or_reports_mismatch() {
    let bus = FakeBus::new().topic("user-events", &["a", "b", "c"]);
    let executor = with_bus(bus);

    let out = output(
        &executor,
        "kafka_assert_count",
        json!({"topic": "user-events", "count": 3}),
    )
    .await;
    assert_eq!(out, json!({"ok": true, "total": 3}));

    let out = output(
        &executor,
        "kafka_assert_count",
        json!({"topic": "user-events", "count": 1}),
    )
    .await;
    assert_eq!(
        out,
        json!({"ok": false, "expected": 1, "actual": 3, "messages": ["a", "b", "c"]})
    );

    let out = output(
        &executor,
        "kafka_assert_count",
        json!({"topic": "empty", "count": 0}),
    )
    .await;
    assert_eq!(out, json!({"ok": true, "total": 0}));
}

#[tokio::test]
async fn kafka_contains_counts_substring_matches() {
    let bus = FakeBus::new().topic(
        "user-events",
        &[r#"{"type":"created","id":1}"#, r#"{"type":"deleted","id":1}"#, r#"{"type":"created","id":2}"#],
    );
    let executor = with_bus(bus);

    let out = output(
        &executor,
        "kafka_assert_contains",
        json!({"topic": "user-events", "substr": "created", "want_count": 2}),
    )
    .await;
    assert_eq!(out, json!({"ok": true, "matched": 2, "total": 3}));

    let out = output(
        &executor,
        "kafka_assert_contains",
        json!({"topic": "user-events", "substr": "updated", "want_count": 1}),
    )
    .await;
    assert_eq!(out["ok"], false);
    assert_eq!(out["matched"], 0);
    assert_eq!(out["total"], 3);
    assert_eq!(out["messages"].as_array().unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn kafka_snapshot_read_times_out() {
    let bus = FakeBus::new().topic("slow", &["only one"]).announce("slow", 5);
    let executor = ToolExecutor::new(arc(RecordingHttp::new()))
        .with_message_bus(Some(arc(bus)))
        .with_bus_timeout(Duration::from_secs(2));

    let out = output(&executor, "kafka_assert_count", json!({"topic": "slow", "count": 5})).await;
    assert_eq!(out, json!({"error": "Timeout after 2000ms"}));
}

#[tokio::test]
async fn snapshot_read_times_out_when_consumer_never_waits() {
    let bus = FakeBus::new()
        .topic("spinning", &["one"])
        .announce("spinning", 3)
        .busy();
    let executor = ToolExecutor::new(arc(RecordingHttp::new()))
        .with_message_bus(Some(arc(bus)))
        .with_bus_timeout(Duration::from_millis(50));

    let out = output(
        &executor,
        "kafka_assert_count",
        json!({"topic": "spinning", "count": 3}),
    )
    .await;
    assert_eq!(out, json!({"error": "Timeout after 50ms"}));
}

#[tokio::test]
async fn catalog_grows_with_backends() {
    let executor = ToolExecutor::new(arc(RecordingHttp::new()))
        .with_sql(Some(arc(FakeSql::default())))
        .with_message_bus(Some(arc(FakeBus::new())));
    let names: Vec<String> = executor.tools().into_iter().map(|t| t.name).collect();
    assert_eq!(
        names,
        vec![
            "http_request",
            "sql_exec",
            "sql_query_one",
            "sql_query_all",
            "kafka_assert_count",
            "kafka_assert_contains"
        ]
    );
}
