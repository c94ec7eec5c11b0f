//! Story planning: turns a [`SourceModel`] into user stories.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ProbeError;
use crate::provider::{complete_or_cancel, CompletionBackend};
use crate::types::{Message, SourceModel, UserStory};

const RETRY_PROMPT: &str = "Return only JSON array, your previous response was not valid JSON";

const PLAN_INSTRUCTIONS: &str = r#"
Generate a JSON array of user stories covering:
- Main happy path for each endpoint
- Key error cases (404, invalid input)
- Cross-service flows (create entity → verify side effect in DB or Kafka)

Each story:
{
  "title": "short name",
  "description": "what is being tested",
  "steps": ["human-readable step 1", "step 2", ...]
}

Return ONLY valid JSON array. No markdown, no explanation."#;

/// Drafts user stories with a completion backend.
pub struct StoryGenerator<'a> {
    completion: &'a dyn CompletionBackend,
}

impl<'a> StoryGenerator<'a> {
    pub fn new(completion: &'a dyn CompletionBackend) -> Self {
        Self { completion }
    }

    /// Generate stories for `source`.
    ///
    /// A reply without a parseable JSON array is retried exactly once with a
    /// corrective message. Completion errors are returned without retry.
    pub async fn generate(
        &self,
        source: &SourceModel,
        cancel: &CancellationToken,
    ) -> Result<Vec<UserStory>, ProbeError> {
        let mut messages = vec![Message::user(build_plan_prompt(source))];
        let reply = complete_or_cancel(self.completion, &messages, &[], cancel).await?;

        let err = match parse_stories(&reply.content) {
            Ok(stories) => return Ok(log_planned(stories)),
            Err(err) => err,
        };
        warn!(error = %err, "story reply was not a JSON array, asking again");

        messages.push(Message::assistant(reply.content));
        messages.push(Message::user(RETRY_PROMPT));
        let reply = complete_or_cancel(self.completion, &messages, &[], cancel).await?;
        parse_stories(&reply.content).map(log_planned)
    }
}

fn log_planned(stories: Vec<UserStory>) -> Vec<UserStory> {
    info!(stories = stories.len(), "stories planned");
    stories
}

/// Planning prompt embedding the extracted surface.
pub fn build_plan_prompt(source: &SourceModel) -> String {
    let mut prompt = String::from("You are an integration test planner for a Go backend service.\n\n");

    prompt.push_str("Project endpoints:\n");
    if source.endpoints.is_empty() {
        prompt.push_str("  none\n");
    }
    for ep in &source.endpoints {
        prompt.push_str(&format!("  {} {} (handler: {})\n", ep.method, ep.path, ep.handler));
    }

    prompt.push_str("\nData models:\n");
    if source.models.is_empty() {
        prompt.push_str("  none\n");
    }
    for model in &source.models {
        prompt.push_str(&format!("  {}: {}\n", model.name, model.fields.join(", ")));
    }

    prompt.push_str(&format!("\nDatabase tables: {}\n", or_none(&source.tables)));
    prompt.push_str(&format!("Kafka topics: {}\n", or_none(&source.topics)));
    prompt.push_str(PLAN_INSTRUCTIONS);
    prompt
}

fn or_none(set: &std::collections::BTreeSet<String>) -> String {
    if set.is_empty() {
        "none".to_string()
    } else {
        crate::types::source::join(set)
    }
}

#[derive(Deserialize)]
struct StoryDraft {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    steps: Vec<String>,
}

/// Parse the JSON array spanning the first `[` to the last `]` of `text`,
/// ignoring any surrounding prose or markdown fences.
pub fn parse_stories(text: &str) -> Result<Vec<UserStory>, ProbeError> {
    let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) else {
        return Err(ProbeError::StoryParse("no JSON array found in response".into()));
    };
    if start >= end {
        return Err(ProbeError::StoryParse("no JSON array found in response".into()));
    }
    let drafts: Vec<StoryDraft> = serde_json::from_str(&text[start..=end])
        .map_err(|e| ProbeError::StoryParse(format!("parse stories: {e}")))?;
    Ok(drafts
        .into_iter()
        .map(|d| UserStory::new(d.title, d.description, d.steps))
        .collect())
}
