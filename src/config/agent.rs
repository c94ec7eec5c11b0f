//! Programmatic agent configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;

use crate::backends::{HttpBackend, MessageBus, SqlBackend};
use crate::extract::{GoSourceExtractor, SourceExtractor};
use crate::observer::{NoopObserver, Observer};
use crate::provider::CompletionBackend;
use crate::tools::DEFAULT_BUS_READ_TIMEOUT;

pub const DEFAULT_MAX_STEPS_TOTAL: usize = 200;
pub const DEFAULT_MAX_STEPS_PER_STORY: usize = 20;

/// Every option an [`Agent`](crate::agent::Agent) recognizes.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use storyprobe::prelude::*;
/// # fn demo(llm: Arc<dyn CompletionBackend>) {
/// let config = AgentConfig::builder()
///     .completion(llm)
///     .source_path("./service")
///     .service_url("http://localhost:8080")
///     .max_steps_total(50)
///     .build();
/// # }
/// ```
#[derive(Builder, Clone)]
pub struct AgentConfig {
    pub completion: Arc<dyn CompletionBackend>,
    #[builder(into, default = PathBuf::from("."))]
    pub source_path: PathBuf,
    #[builder(default = Arc::new(GoSourceExtractor) as Arc<dyn SourceExtractor>)]
    pub extractor: Arc<dyn SourceExtractor>,
    pub sql: Option<Arc<dyn SqlBackend>>,
    pub message_bus: Option<Arc<dyn MessageBus>>,
    /// HTTP client for the service; a reqwest client rooted at
    /// `service_url` when unset.
    pub http: Option<Arc<dyn HttpBackend>>,
    #[builder(into)]
    pub service_url: Option<String>,
    #[builder(default = DEFAULT_MAX_STEPS_TOTAL)]
    pub max_steps_total: usize,
    #[builder(default = DEFAULT_MAX_STEPS_PER_STORY)]
    pub max_steps_per_story: usize,
    #[builder(default = Arc::new(NoopObserver) as Arc<dyn Observer>)]
    pub observer: Arc<dyn Observer>,
    #[builder(default = DEFAULT_BUS_READ_TIMEOUT)]
    pub bus_read_timeout: Duration,
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("completion", &self.completion.name())
            .field("source_path", &self.source_path)
            .field("sql", &self.sql.is_some())
            .field("message_bus", &self.message_bus.is_some())
            .field("http", &self.http.is_some())
            .field("service_url", &self.service_url)
            .field("max_steps_total", &self.max_steps_total)
            .field("max_steps_per_story", &self.max_steps_per_story)
            .field("bus_read_timeout", &self.bus_read_timeout)
            .finish()
    }
}
