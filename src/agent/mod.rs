//! Top-level orchestration: plan stories from source, then run them under
//! a run-wide step budget.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::backends::{HttpBackend, ReqwestHttpBackend};
use crate::config::AgentConfig;
use crate::error::ProbeError;
use crate::generator::StoryGenerator;
use crate::provider::ToolDefinition;
use crate::report::Report;
use crate::runner::{ConversationRunner, StoryBudget};
use crate::tools::ToolExecutor;
use crate::types::UserStory;

pub(crate) const MAX_STEPS_TOTAL_REACHED: &str = "maxStepsTotal reached";
pub(crate) const RUN_CANCELED: &str = "run canceled";

/// Plans and runs integration stories against a live service.
pub struct Agent {
    config: AgentConfig,
    executor: ToolExecutor,
    tools: Vec<ToolDefinition>,
}

impl Agent {
    /// Build an agent, creating a reqwest HTTP backend rooted at
    /// `service_url` when none is configured.
    pub fn new(config: AgentConfig) -> Result<Self, ProbeError> {
        let http: Arc<dyn HttpBackend> = match &config.http {
            Some(http) => Arc::clone(http),
            None => Arc::new(ReqwestHttpBackend::new(
                config.service_url.clone().unwrap_or_default(),
            )?),
        };
        let executor = ToolExecutor::new(http)
            .with_sql(config.sql.clone())
            .with_message_bus(config.message_bus.clone())
            .with_bus_timeout(config.bus_read_timeout);
        let tools = executor.tools();
        Ok(Self {
            config,
            executor,
            tools,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Tool catalog offered to the model during runs.
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Extract the source surface and draft stories from it.
    pub async fn plan(&self, cancel: &CancellationToken) -> Result<Vec<UserStory>, ProbeError> {
        if cancel.is_cancelled() {
            return Err(ProbeError::Canceled);
        }
        let extractor = Arc::clone(&self.config.extractor);
        let root = self.config.source_path.clone();
        let source = tokio::task::spawn_blocking(move || extractor.extract(&root))
            .await
            .map_err(|e| {
                ProbeError::extraction(&self.config.source_path, format!("extractor task failed: {e}"))
            })??;
        info!(summary = %source.summary(), "planning stories");

        StoryGenerator::new(self.config.completion.as_ref())
            .generate(&source, cancel)
            .await
    }

    /// Run `stories` in order.
    ///
    /// A story is skipped once the run-wide step count reaches
    /// `max_steps_total`, or when `cancel` fired before it started. Story
    /// failures never abort the run; they are recorded in the report.
    pub async fn run(&self, stories: Vec<UserStory>, cancel: &CancellationToken) -> Report {
        let started_at = Utc::now();
        let started = Instant::now();
        let total = stories.len();
        let max_total = self.config.max_steps_total;
        let observer = self.config.observer.as_ref();
        let runner = ConversationRunner::new(
            self.config.completion.as_ref(),
            &self.executor,
            &self.tools,
            observer,
        )
        .with_service_url(self.config.service_url.as_deref());

        let mut results = Vec::with_capacity(total);
        let mut total_steps = 0;
        for (index, story) in stories.into_iter().enumerate() {
            let skip_reason = if cancel.is_cancelled() {
                Some(RUN_CANCELED)
            } else if total_steps >= max_total {
                Some(MAX_STEPS_TOTAL_REACHED)
            } else {
                None
            };
            if let Some(reason) = skip_reason {
                let story = story.skip(reason);
                info!(story = %story.title, reason, "story skipped");
                observer.on_story_start(index, total, &story);
                observer.on_story_done(index, total, &story);
                results.push(story);
                continue;
            }

            let budget = StoryBudget {
                max_steps_per_story: self.config.max_steps_per_story,
                steps_remaining: max_total - total_steps,
            };
            let outcome = runner.run(story, budget, index, total, cancel).await;
            total_steps += outcome.steps;
            results.push(outcome.story);
        }

        let report = Report::build(results, total_steps, started.elapsed(), started_at);
        info!(
            passed = report.passed,
            failed = report.failed,
            skipped = report.skipped,
            steps = report.total_steps,
            "run finished"
        );
        report
    }

    /// [`plan`](Self::plan) then [`run`](Self::run).
    pub async fn run_all(&self, cancel: &CancellationToken) -> Result<Report, ProbeError> {
        let stories = self.plan(cancel).await?;
        Ok(self.run(stories, cancel).await)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("config", &self.config)
            .field("tools", &self.tools.iter().map(|t| &t.name).collect::<Vec<_>>())
            .finish()
    }
}
