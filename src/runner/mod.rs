//! Drives one story through a bounded tool-calling conversation.

mod prompt;
mod verdict;

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ProbeError;
use crate::observer::Observer;
use crate::provider::{complete_or_cancel, CompletionBackend, ToolDefinition};
use crate::tools::ToolExecutor;
use crate::types::{Message, StoryStatus, UserStory};

pub use prompt::build_run_prompt;
pub use verdict::{parse_verdict, Verdict};

pub(crate) const MAX_STEPS_PER_STORY_REACHED: &str = "maxStepsPerStory reached";
pub(crate) const CANCELED: &str = "canceled";

/// Step limits for a single story.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoryBudget {
    pub max_steps_per_story: usize,
    /// Steps left in the run-wide budget.
    pub steps_remaining: usize,
}

impl StoryBudget {
    pub fn effective_max(&self) -> usize {
        self.max_steps_per_story.min(self.steps_remaining)
    }
}

/// A finished story and the steps it consumed, guard turns included.
#[derive(Debug, Clone)]
pub struct StoryOutcome {
    pub story: UserStory,
    pub steps: usize,
}

/// Runs stories against a completion backend and a tool executor.
pub struct ConversationRunner<'a> {
    completion: &'a dyn CompletionBackend,
    executor: &'a ToolExecutor,
    tools: &'a [ToolDefinition],
    observer: &'a dyn Observer,
    service_url: Option<&'a str>,
}

impl<'a> ConversationRunner<'a> {
    pub fn new(
        completion: &'a dyn CompletionBackend,
        executor: &'a ToolExecutor,
        tools: &'a [ToolDefinition],
        observer: &'a dyn Observer,
    ) -> Self {
        Self {
            completion,
            executor,
            tools,
            observer,
            service_url: None,
        }
    }

    pub fn with_service_url(mut self, service_url: Option<&'a str>) -> Self {
        self.service_url = service_url;
        self
    }

    /// Run `story` to a terminal status.
    ///
    /// Each turn either classifies a final answer, executes the requested
    /// tool calls in order (one step each), or counts a guard step when the
    /// model returned neither. The loop ends without a verdict once
    /// `budget.effective_max()` steps are consumed. A single turn may
    /// overshoot the budget by its own number of tool calls.
    pub async fn run(
        &self,
        mut story: UserStory,
        budget: StoryBudget,
        index: usize,
        total: usize,
        cancel: &CancellationToken,
    ) -> StoryOutcome {
        self.observer.on_story_start(index, total, &story);
        info!(story = %story.title, index = index + 1, total, "story started");

        let started = Instant::now();
        let effective_max = budget.effective_max();
        story.step_results.clear();
        let mut messages = vec![Message::user(build_run_prompt(&story, self.service_url))];
        let mut steps = 0;

        let verdict = 'turns: loop {
            if steps >= effective_max {
                warn!(story = %story.title, steps, "step budget exhausted");
                break Verdict::Failed(MAX_STEPS_PER_STORY_REACHED.to_string());
            }

            let response =
                match complete_or_cancel(self.completion, &messages, self.tools, cancel).await {
                    Ok(response) => response,
                    Err(ProbeError::Canceled) => break Verdict::Failed(CANCELED.to_string()),
                    Err(err) => break Verdict::Failed(format!("llm error: {err}")),
                };

            if response.done {
                break parse_verdict(&response.content);
            }

            if response.tool_calls.is_empty() {
                warn!(story = %story.title, step = steps + 1, "empty turn, counting a guard step");
                steps += 1;
                continue;
            }

            messages.push(Message::assistant_tool_calls(response.tool_calls.clone()));
            for call in &response.tool_calls {
                if cancel.is_cancelled() {
                    break 'turns Verdict::Failed(CANCELED.to_string());
                }
                let step = self.executor.execute(call).await;
                steps += 1;
                debug!(story = %story.title, step = steps, tool = %step.tool, "tool executed");
                self.observer.on_step(index, total, &step);
                messages.push(Message::tool_result(call.id.clone(), step.output.clone()));
                story.step_results.push(step);
            }
        };

        match verdict {
            Verdict::Passed => {
                story.status = StoryStatus::Passed;
                story.error = None;
            }
            Verdict::Failed(reason) => {
                story.status = StoryStatus::Failed;
                story.error = Some(reason);
            }
        }
        story.duration = started.elapsed();

        info!(
            story = %story.title,
            status = %story.status,
            steps,
            duration_ms = story.duration.as_millis() as u64,
            "story finished"
        );
        self.observer.on_story_done(index, total, &story);
        StoryOutcome { story, steps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_max_is_the_tighter_limit() {
        let budget = StoryBudget {
            max_steps_per_story: 20,
            steps_remaining: 3,
        };
        assert_eq!(budget.effective_max(), 3);
        let budget = StoryBudget {
            max_steps_per_story: 2,
            steps_remaining: 200,
        };
        assert_eq!(budget.effective_max(), 2);
    }
}
