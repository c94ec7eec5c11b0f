//! Configuration: the programmatic [`AgentConfig`] and the layered
//! [`ProbeSettings`] used by the command-line runner.

pub mod agent;
pub mod settings;

pub use agent::{AgentConfig, DEFAULT_MAX_STEPS_PER_STORY, DEFAULT_MAX_STEPS_TOTAL};
pub use settings::{default_config_path, ProbeSettings};
