//! Tool catalog and execution for story conversations.

pub mod bus;
pub mod catalog;
pub mod executor;
pub mod types;

pub use bus::{read_snapshot, DEFAULT_BUS_READ_TIMEOUT};
pub use catalog::{catalog, Capabilities, ToolName};
pub use executor::ToolExecutor;
pub use types::{ParameterBuilder, ToolParameters};
