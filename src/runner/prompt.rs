use crate::types::UserStory;

const RUN_RULES: &str = "
Rules:
- Start with sql_exec TRUNCATE to ensure clean state (if SQL tools are available)
- Execute each step using tools
- Verify HTTP response status after each request
- If any step fails, stop and report failure with clear reason
- When all steps complete, respond with exactly:
  PASSED
  or
  FAILED: <reason>
";

/// Opening user message for a story conversation.
pub fn build_run_prompt(story: &UserStory, service_url: Option<&str>) -> String {
    let mut prompt = String::from("You are an integration test executor for a Go backend service.\n");
    if let Some(url) = service_url.filter(|u| !u.is_empty()) {
        prompt.push_str(&format!("Service URL: {url}\n"));
    }
    prompt.push_str("\nExecute this user story using the available tools:\n\n");
    prompt.push_str(&format!("Title: {}\n", story.title));
    prompt.push_str(&format!("Description: {}\n", story.description));

    if !story.steps.is_empty() {
        prompt.push_str("\nExpected steps:\n");
        for (i, step) in story.steps.iter().enumerate() {
            prompt.push_str(&format!("{}. {step}\n", i + 1));
        }
    }

    prompt.push_str(RUN_RULES);
    prompt
}
