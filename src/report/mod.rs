//! Aggregated results of a run.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProbeError;
use crate::observer::format_duration;
use crate::types::story::duration_ms;
use crate::types::{StoryStatus, UserStory};
use crate::util::truncate;

const LINE_WIDTH: usize = 64;

/// Outcome of a run, built once when the last story finishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub user_stories: Vec<UserStory>,
    pub total_steps: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
}

impl Report {
    pub fn build(
        user_stories: Vec<UserStory>,
        total_steps: usize,
        duration: Duration,
        started_at: DateTime<Utc>,
    ) -> Self {
        let count = |status| user_stories.iter().filter(|s| s.status == status).count();
        Self {
            passed: count(StoryStatus::Passed),
            failed: count(StoryStatus::Failed),
            skipped: count(StoryStatus::Skipped),
            user_stories,
            total_steps,
            duration,
            started_at,
        }
    }

    /// Whether no story failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn to_json(&self) -> Result<String, ProbeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hr = "━".repeat(LINE_WIDTH);
        let total = format_duration(self.duration);

        writeln!(f, "{hr}")?;
        let meta = format!(
            "{total} · {} stories · {} steps",
            self.user_stories.len(),
            self.total_steps
        );
        let pad = LINE_WIDTH.saturating_sub(meta.chars().count());
        writeln!(f, "{:<pad$}{meta}", " Integration Test Report")?;
        writeln!(f, "{hr}")?;

        for story in &self.user_stories {
            let reason = story.error.as_deref().unwrap_or_default();
            match story.status {
                StoryStatus::Passed | StoryStatus::Failed => {
                    let label = if story.status == StoryStatus::Passed { "PASS" } else { "FAIL" };
                    let right = format!(
                        "{} steps  {}",
                        story.step_results.len(),
                        format_duration(story.duration)
                    );
                    let width = LINE_WIDTH.saturating_sub(8 + right.chars().count());
                    writeln!(f, "  {label}  {:<width$}  {right}", truncate(&story.title, width))?;
                    if story.status == StoryStatus::Passed {
                        continue;
                    }
                    if !reason.is_empty() {
                        writeln!(f, "        Reason: {reason}")?;
                    }
                    if !story.step_results.is_empty() {
                        writeln!(f, "        Steps executed:")?;
                        for (i, step) in story.step_results.iter().enumerate() {
                            writeln!(
                                f,
                                "          [{}] {:<18} {:<28} → {}",
                                i + 1,
                                step.tool,
                                truncate(&step.input, 28),
                                truncate(&step.output, 22)
                            )?;
                        }
                    }
                }
                StoryStatus::Skipped => {
                    let width = LINE_WIDTH - 10;
                    writeln!(f, "  SKIP  {:<width$}  {reason}", truncate(&story.title, width))?;
                }
                StoryStatus::Pending => writeln!(f, "  ????  {}", story.title)?,
            }
        }

        writeln!(f, "{hr}")?;
        writeln!(
            f,
            "  {} passed   {} failed   {} skipped   │   {} steps   │   {total}",
            self.passed, self.failed, self.skipped, self.total_steps
        )?;
        writeln!(f, "{hr}")
    }
}
