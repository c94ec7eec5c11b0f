//! Shared test helpers: scripted completion backend and in-memory
//! collaborators.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use storyprobe::backends::{
    BusConsumer, HttpBackend, HttpMethod, HttpReply, MessageBus, PartitionOffset, Row, SqlArgs,
    SqlBackend,
};
use storyprobe::error::ProbeError;
use storyprobe::observer::Observer;
use storyprobe::provider::{CompletionBackend, ToolDefinition};
use storyprobe::types::{Message, Response, StepResult, ToolCall, UserStory};

pub fn tool_call(id: &str, name: &str, input: Value) -> ToolCall {
    ToolCall::new(id, name, input.to_string())
}

pub fn http_get(id: &str, path: &str) -> ToolCall {
    tool_call(id, "http_request", json!({"method": "GET", "path": path}))
}

/// A completion backend that replays queued responses in order.
#[derive(Default)]
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Result<Response, ProbeError>>>,
    /// Returned once the script runs out.
    fallback: Mutex<Option<Response>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<(Vec<Message>, Vec<ToolDefinition>)>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(self, content: &str) -> Self {
        self.response(Response::text(content))
    }

    pub fn tool_calls(self, calls: Vec<ToolCall>) -> Self {
        self.response(Response::from_parts("", calls))
    }

    pub fn response(self, response: Response) -> Self {
        self.script.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn error(self, err: ProbeError) -> Self {
        self.script.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn then_always(self, response: Response) -> Self {
        *self.fallback.lock().unwrap() = Some(response);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(Vec<Message>, Vec<ToolDefinition>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Response, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), tools.to_vec()));
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        match self.fallback.lock().unwrap().clone() {
            Some(response) => Ok(response),
            None => Err(ProbeError::api(500, "script exhausted")),
        }
    }
}

/// A completion backend whose calls never finish.
#[derive(Default)]
pub struct PendingCompletion {
    calls: AtomicUsize,
}

impl PendingCompletion {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for PendingCompletion {
    fn name(&self) -> &str {
        "pending"
    }

    async fn complete(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<Response, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Answers `200 {}` and cancels `token` while serving the first request.
pub struct CancelingHttp {
    token: CancellationToken,
    requests: AtomicUsize,
}

impl CancelingHttp {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpBackend for CancelingHttp {
    async fn send(
        &self,
        _method: HttpMethod,
        _path: &str,
        _body: Option<&Value>,
    ) -> Result<HttpReply, ProbeError> {
        if self.requests.fetch_add(1, Ordering::SeqCst) == 0 {
            self.token.cancel();
        }
        Ok(HttpReply {
            status: 200,
            body: b"{}".to_vec(),
        })
    }
}

/// Records every request and answers with queued replies (default `200 {}`).
#[derive(Default)]
pub struct RecordingHttp {
    replies: Mutex<VecDeque<Result<HttpReply, ProbeError>>>,
    pub requests: Mutex<Vec<(HttpMethod, String, Option<Value>)>>,
}

impl RecordingHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, status: u16, body: &str) -> Self {
        self.replies.lock().unwrap().push_back(Ok(HttpReply {
            status,
            body: body.as_bytes().to_vec(),
        }));
        self
    }

    pub fn fail(self, err: ProbeError) -> Self {
        self.replies.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn recorded(&self) -> Vec<(HttpMethod, String, Option<Value>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpBackend for RecordingHttp {
    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<HttpReply, ProbeError> {
        self.requests
            .lock()
            .unwrap()
            .push((method, path.to_string(), body.cloned()));
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(HttpReply {
                status: 200,
                body: b"{}".to_vec(),
            })
        })
    }
}

/// In-memory SQL backend returning fixed results.
#[derive(Default)]
pub struct FakeSql {
    pub rows_affected: u64,
    pub rows: Vec<Row>,
    pub error: Option<String>,
    pub statements: Mutex<Vec<(String, SqlArgs)>>,
}

impl FakeSql {
    pub fn with_rows(rows: Vec<Value>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .filter_map(|v| v.as_object().cloned())
                .collect(),
            ..Default::default()
        }
    }

    fn record(&self, query: &str, args: &SqlArgs) -> Result<(), ProbeError> {
        self.statements
            .lock()
            .unwrap()
            .push((query.to_string(), args.clone()));
        match &self.error {
            Some(message) => Err(ProbeError::Sql(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SqlBackend for FakeSql {
    async fn exec(&self, query: &str, args: &SqlArgs) -> Result<u64, ProbeError> {
        self.record(query, args)?;
        Ok(self.rows_affected)
    }

    async fn query_one(&self, query: &str, args: &SqlArgs) -> Result<Option<Row>, ProbeError> {
        self.record(query, args)?;
        Ok(self.rows.first().cloned())
    }

    async fn query_all(&self, query: &str, args: &SqlArgs) -> Result<Vec<Row>, ProbeError> {
        self.record(query, args)?;
        Ok(self.rows.clone())
    }
}

/// In-memory message bus.
///
/// End offsets report `announced` records per topic (defaults to the number
/// stored); consumers hand out stored records two at a time and idle once
/// drained. A `busy` bus returns empty batches without waiting instead.
#[derive(Default)]
pub struct FakeBus {
    topics: HashMap<String, Vec<Vec<u8>>>,
    announced: HashMap<String, i64>,
    busy: bool,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topic(mut self, name: &str, messages: &[&str]) -> Self {
        self.topics.insert(
            name.to_string(),
            messages.iter().map(|m| m.as_bytes().to_vec()).collect(),
        );
        self
    }

    /// Claim more records than will ever be delivered.
    pub fn announce(mut self, name: &str, count: i64) -> Self {
        self.announced.insert(name.to_string(), count);
        self
    }

    pub fn busy(mut self) -> Self {
        self.busy = true;
        self
    }
}

#[async_trait]
impl MessageBus for FakeBus {
    async fn end_offsets(&self, topic: &str) -> Result<Vec<PartitionOffset>, ProbeError> {
        let stored = self.topics.get(topic).map_or(0, |m| m.len() as i64);
        let offset = self.announced.get(topic).copied().unwrap_or(stored);
        Ok(vec![
            PartitionOffset {
                partition: 0,
                offset,
                error: None,
            },
            PartitionOffset {
                partition: 1,
                offset: 7,
                error: Some("leader not available".into()),
            },
        ])
    }

    async fn consume_from_start(&self, topic: &str) -> Result<Box<dyn BusConsumer>, ProbeError> {
        let pending = self.topics.get(topic).cloned().unwrap_or_default();
        Ok(Box::new(FakeConsumer {
            pending: pending.into(),
            busy: self.busy,
        }))
    }
}

struct FakeConsumer {
    pending: VecDeque<Vec<u8>>,
    busy: bool,
}

#[async_trait]
impl BusConsumer for FakeConsumer {
    async fn poll(&mut self) -> Result<Vec<Vec<u8>>, ProbeError> {
        if self.pending.is_empty() {
            if self.busy {
                return Ok(Vec::new());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(Vec::new());
        }
        let take = self.pending.len().min(2);
        Ok(self.pending.drain(..take).collect())
    }
}

/// Observer event, in the order received.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start(usize, usize, String),
    Step(usize, String),
    Done(usize, String, storyprobe::types::StoryStatus),
}

#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl Observer for RecordingObserver {
    fn on_story_start(&self, index: usize, total: usize, story: &UserStory) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Start(index, total, story.title.clone()));
    }

    fn on_step(&self, index: usize, _total: usize, step: &StepResult) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Step(index, step.tool.clone()));
    }

    fn on_story_done(&self, index: usize, _total: usize, story: &UserStory) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Done(index, story.title.clone(), story.status));
    }
}

pub fn story(title: &str) -> UserStory {
    UserStory::new(title, format!("{title} description"), vec!["do it".into()])
}

pub fn arc<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
