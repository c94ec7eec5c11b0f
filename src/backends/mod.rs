//! Collaborator interfaces the tool executor drives: an HTTP client for the
//! service under test, a SQL backend and a message bus.

pub mod http;

#[cfg(feature = "kafka")]
pub mod kafka;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::error::ProbeError;

pub use http::ReqwestHttpBackend;
#[cfg(feature = "kafka")]
pub use kafka::KafkaBus;
#[cfg(feature = "postgres")]
pub use postgres::PgBackend;

/// HTTP methods the `http_request` tool accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Whether requests with this method carry a body.
    pub fn has_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

/// Status and raw body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

/// HTTP client rooted at the service under test.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    /// Send `method path`, JSON-encoding `body` when present.
    async fn send(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<HttpReply, ProbeError>;
}

/// A result row as a column-name → JSON value map.
pub type Row = Map<String, Value>;

/// Query arguments: `$1..$n` positional values or `@name` named values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SqlArgs {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

impl Default for SqlArgs {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

/// SQL backend shared across all stories of a run.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    /// Execute a statement, returning the number of affected rows.
    async fn exec(&self, query: &str, args: &SqlArgs) -> Result<u64, ProbeError>;

    /// First row of the result, `None` when the query returned nothing.
    async fn query_one(&self, query: &str, args: &SqlArgs) -> Result<Option<Row>, ProbeError>;

    async fn query_all(&self, query: &str, args: &SqlArgs) -> Result<Vec<Row>, ProbeError>;
}

/// End offset of one topic partition. Entries with an error or a negative
/// partition are ignored when counting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOffset {
    pub partition: i32,
    pub offset: i64,
    pub error: Option<String>,
}

/// Message bus exposing offset lookup and from-the-beginning consumption.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn end_offsets(&self, topic: &str) -> Result<Vec<PartitionOffset>, ProbeError>;

    /// Open a consumer positioned at the start of every partition of `topic`.
    async fn consume_from_start(&self, topic: &str) -> Result<Box<dyn BusConsumer>, ProbeError>;
}

/// A consumer handed out by [`MessageBus::consume_from_start`].
#[async_trait]
pub trait BusConsumer: Send {
    /// Wait for the next batch of record values.
    ///
    /// Implementations should wait for records rather than return an empty
    /// batch immediately; callers yield to the runtime between empty batches.
    async fn poll(&mut self) -> Result<Vec<Vec<u8>>, ProbeError>;
}
