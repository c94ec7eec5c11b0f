//! Convenience re-exports for common use.

pub use crate::agent::Agent;
pub use crate::backends::{BusConsumer, HttpBackend, MessageBus, SqlBackend};
pub use crate::config::AgentConfig;
pub use crate::error::{ProbeError, Result};
pub use crate::extract::{GoSourceExtractor, SourceExtractor};
pub use crate::observer::{ConsoleObserver, NoopObserver, Observer};
pub use crate::provider::{CompletionBackend, ToolDefinition};
pub use crate::report::Report;
pub use crate::types::{
    Message, Response, Role, SourceModel, StepResult, StoryStatus, ToolCall, UserStory,
};
