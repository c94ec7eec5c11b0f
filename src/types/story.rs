//! User stories and the results recorded while running them.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle status of a story.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StoryStatus {
    #[default]
    Pending,
    Passed,
    Failed,
    Skipped,
}

impl StoryStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One executed tool call. Payloads are opaque JSON text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepResult {
    pub tool: String,
    pub input: String,
    pub output: String,
}

/// A single integration-test scenario.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserStory {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Advisory hints for the model; never enforced mechanically.
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub step_results: Vec<StepResult>,
    #[serde(default)]
    pub status: StoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, with = "duration_ms")]
    pub duration: Duration,
}

impl UserStory {
    /// Create a pending story.
    pub fn new(title: impl Into<String>, description: impl Into<String>, steps: Vec<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            steps,
            ..Default::default()
        }
    }

    pub(crate) fn skip(mut self, reason: impl Into<String>) -> Self {
        self.step_results.clear();
        self.duration = Duration::ZERO;
        self.status = StoryStatus::Skipped;
        self.error = Some(reason.into());
        self
    }
}

/// Serialize a [`Duration`] as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
