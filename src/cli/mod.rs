//! Command-line interface for storyprobe.

pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::ProbeSettings;

/// storyprobe CLI
#[derive(Parser, Debug)]
#[command(
    name = "storyprobe",
    version,
    about = "Plan and run LLM-driven integration stories against a live service"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract the service surface and print drafted stories as JSON
    Plan(PlanArgs),
    /// Run stories against the service and print a report
    Run(RunArgs),
}

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Source tree of the service under test
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// TOML config file (defaults to ~/.storyprobe/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Anthropic model id
    #[arg(long)]
    pub model: Option<String>,

    /// Abort after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Arguments for `storyprobe plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Write stories to this file instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Arguments for `storyprobe run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// JSON file of stories to run; planned from source when omitted
    #[arg(long)]
    pub stories: Option<PathBuf>,

    /// Base URL of the running service
    #[arg(long)]
    pub service_url: Option<String>,

    /// Postgres connection URL; enables the SQL tools
    #[arg(long)]
    pub database_url: Option<String>,

    /// Comma-separated Kafka brokers; enables the Kafka assertion tools
    #[arg(long)]
    pub kafka_brokers: Option<String>,

    #[arg(long)]
    pub max_steps_total: Option<usize>,

    #[arg(long)]
    pub max_steps_per_story: Option<usize>,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl CommonArgs {
    fn as_settings(&self) -> ProbeSettings {
        ProbeSettings {
            source_path: self.source.clone(),
            model: self.model.clone(),
            timeout_secs: self.timeout,
            ..Default::default()
        }
    }
}

impl RunArgs {
    /// Flags as the top settings layer.
    pub fn as_settings(&self) -> ProbeSettings {
        ProbeSettings {
            service_url: self.service_url.clone(),
            database_url: self.database_url.clone(),
            kafka_brokers: self.kafka_brokers.clone(),
            max_steps_total: self.max_steps_total,
            max_steps_per_story: self.max_steps_per_story,
            ..self.common.as_settings()
        }
    }
}

impl PlanArgs {
    pub fn as_settings(&self) -> ProbeSettings {
        self.common.as_settings()
    }
}
