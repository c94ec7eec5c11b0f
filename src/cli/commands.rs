//! Handlers for the `plan` and `run` commands.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{OutputFormat, PlanArgs, RunArgs};
use crate::agent::Agent;
use crate::backends::{MessageBus, SqlBackend};
use crate::config::{AgentConfig, ProbeSettings};
use crate::error::ProbeError;
use crate::observer::{ConsoleObserver, Observer};
use crate::provider::anthropic::AnthropicBackend;
use crate::provider::CompletionBackend;
use crate::types::UserStory;

/// Print (or write to `--out`) the planned stories as JSON.
pub async fn handle_plan(args: PlanArgs) -> Result<(), ProbeError> {
    let settings = ProbeSettings::load(args.common.config.as_deref())?.overlay(args.as_settings());
    let cancel = cancel_token(settings.timeout_secs);

    let agent = Agent::new(
        AgentConfig::builder()
            .completion(completion(&settings)?)
            .source_path(settings.source_path())
            .maybe_service_url(settings.service_url.clone())
            .build(),
    )?;
    let stories = agent.plan(&cancel).await?;
    let json = serde_json::to_string_pretty(&stories)?;
    match args.out {
        Some(path) => {
            std::fs::write(&path, json)?;
            info!(path = %path.display(), stories = stories.len(), "stories written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Run stories and print the report. Returns `false` when any story failed.
pub async fn handle_run(args: RunArgs) -> Result<bool, ProbeError> {
    let settings = ProbeSettings::load(args.common.config.as_deref())?.overlay(args.as_settings());
    let service_url = settings.service_url.clone().ok_or_else(|| {
        ProbeError::Configuration(
            "service URL is required (--service-url or STORYPROBE_SERVICE_URL)".into(),
        )
    })?;
    let cancel = cancel_token(settings.timeout_secs);

    // Keep stdout clean for the JSON report.
    let observer: Arc<dyn Observer> = match args.format {
        OutputFormat::Text => Arc::new(ConsoleObserver::stdout()),
        OutputFormat::Json => Arc::new(ConsoleObserver::new(std::io::stderr())),
    };
    let config = AgentConfig::builder()
        .completion(completion(&settings)?)
        .source_path(settings.source_path())
        .service_url(service_url)
        .maybe_sql(sql_backend(settings.database_url.as_deref()).await?)
        .maybe_message_bus(message_bus(settings.kafka_brokers.as_deref()).await?)
        .max_steps_total(settings.max_steps_total())
        .max_steps_per_story(settings.max_steps_per_story())
        .observer(observer)
        .build();
    let agent = Agent::new(config)?;

    let stories = match &args.stories {
        Some(path) => load_stories(path)?,
        None => agent.plan(&cancel).await?,
    };
    let report = agent.run(stories, &cancel).await;
    match args.format {
        OutputFormat::Text => println!("\n{report}"),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }
    Ok(report.is_success())
}

fn completion(settings: &ProbeSettings) -> Result<Arc<dyn CompletionBackend>, ProbeError> {
    let api_key = settings
        .anthropic_api_key
        .clone()
        .ok_or_else(|| ProbeError::Configuration("ANTHROPIC_API_KEY is not set".into()))?;
    Ok(Arc::new(AnthropicBackend::new(
        api_key,
        settings.model.clone(),
        settings.anthropic_base_url.clone(),
    )))
}

#[cfg(feature = "postgres")]
async fn sql_backend(url: Option<&str>) -> Result<Option<Arc<dyn SqlBackend>>, ProbeError> {
    match url {
        Some(url) => {
            let backend: Arc<dyn SqlBackend> = Arc::new(crate::backends::PgBackend::connect(url).await?);
            Ok(Some(backend))
        }
        None => Ok(None),
    }
}

#[cfg(not(feature = "postgres"))]
async fn sql_backend(url: Option<&str>) -> Result<Option<Arc<dyn SqlBackend>>, ProbeError> {
    match url {
        Some(_) => Err(ProbeError::Configuration(
            "a database URL was given but storyprobe was built without the `postgres` feature"
                .into(),
        )),
        None => Ok(None),
    }
}

#[cfg(feature = "kafka")]
async fn message_bus(brokers: Option<&str>) -> Result<Option<Arc<dyn MessageBus>>, ProbeError> {
    match brokers {
        Some(brokers) => {
            let bus: Arc<dyn MessageBus> = Arc::new(crate::backends::KafkaBus::connect(brokers).await?);
            Ok(Some(bus))
        }
        None => Ok(None),
    }
}

#[cfg(not(feature = "kafka"))]
async fn message_bus(brokers: Option<&str>) -> Result<Option<Arc<dyn MessageBus>>, ProbeError> {
    match brokers {
        Some(_) => Err(ProbeError::Configuration(
            "Kafka brokers were given but storyprobe was built without the `kafka` feature".into(),
        )),
        None => Ok(None),
    }
}

fn load_stories(path: &Path) -> Result<Vec<UserStory>, ProbeError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| ProbeError::StoryParse(format!("{}: {e}", path.display())))
}

/// Token canceled by Ctrl-C or after `timeout_secs`.
fn cancel_token(timeout_secs: Option<u64>) -> CancellationToken {
    let token = CancellationToken::new();
    if let Some(secs) = timeout_secs {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!(timeout_secs = secs, "deadline reached, canceling");
            token.cancel();
        });
    }
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, canceling");
            interrupt.cancel();
        }
    });
    token
}
