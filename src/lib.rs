//! storyprobe: LLM-driven integration testing for backend services.
//!
//! The agent extracts a service's surface from source (HTTP endpoints, data
//! models, SQL tables, message-bus topics), asks a completion backend to
//! draft user stories from it, then runs each story as a bounded
//! tool-calling conversation that issues real HTTP requests, SQL statements
//! and topic assertions against a live instance. Results are collected in a
//! pass/fail/skip [`Report`](report::Report).
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use storyprobe::prelude::*;
//! use storyprobe::provider::anthropic::AnthropicBackend;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> storyprobe::error::Result<()> {
//! let llm = AnthropicBackend::new(std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(), None, None);
//! let agent = Agent::new(
//!     AgentConfig::builder()
//!         .completion(Arc::new(llm))
//!         .source_path("./service")
//!         .service_url("http://localhost:8080")
//!         .observer(Arc::new(ConsoleObserver::stdout()))
//!         .build(),
//! )?;
//! let report = agent.run_all(&CancellationToken::new()).await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod backends;
pub mod config;
pub mod error;
pub mod extract;
pub mod generator;
pub mod observer;
pub mod prelude;
pub mod provider;
pub mod report;
pub mod runner;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
