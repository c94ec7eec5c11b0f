//! Progress notifications for story runs.

use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use crate::types::{StepResult, StoryStatus, UserStory};
use crate::util::truncate;

/// Receives synchronous, in-order notifications while stories run.
///
/// `index` is zero-based; `total` is the number of stories in the run.
pub trait Observer: Send + Sync {
    fn on_story_start(&self, index: usize, total: usize, story: &UserStory);
    fn on_step(&self, index: usize, total: usize, step: &StepResult);
    fn on_story_done(&self, index: usize, total: usize, story: &UserStory);
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_story_start(&self, _index: usize, _total: usize, _story: &UserStory) {}
    fn on_step(&self, _index: usize, _total: usize, _step: &StepResult) {}
    fn on_story_done(&self, _index: usize, _total: usize, _story: &UserStory) {}
}

/// Prints live progress lines.
///
/// ```text
/// [1/4] Create user happy path
///       → sql_exec         {"query":"TRUNCATE users"}                 → {"rows_affected":0}
///       ✓ passed  (2 steps, 1.2s)
/// ```
pub struct ConsoleObserver {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleObserver {
    /// Observer writing to stdout.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    fn write(&self, line: std::fmt::Arguments<'_>) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        // Progress output is best-effort.
        let _ = out.write_fmt(line);
        let _ = out.flush();
    }
}

impl Default for ConsoleObserver {
    fn default() -> Self {
        Self::stdout()
    }
}

impl std::fmt::Debug for ConsoleObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleObserver").finish_non_exhaustive()
    }
}

impl Observer for ConsoleObserver {
    fn on_story_start(&self, index: usize, total: usize, story: &UserStory) {
        self.write(format_args!("\n[{}/{}] {}\n", index + 1, total, story.title));
    }

    fn on_step(&self, _index: usize, _total: usize, step: &StepResult) {
        self.write(format_args!(
            "      → {:<16} {:<42} → {}\n",
            step.tool,
            truncate(&step.input, 42),
            truncate(&step.output, 32)
        ));
    }

    fn on_story_done(&self, _index: usize, _total: usize, story: &UserStory) {
        let reason = story.error.as_deref().unwrap_or_default();
        match story.status {
            StoryStatus::Passed => self.write(format_args!(
                "      ✓ passed  ({} steps, {})\n",
                story.step_results.len(),
                format_duration(story.duration)
            )),
            StoryStatus::Failed => self.write(format_args!("      ✗ FAILED: {reason}\n")),
            StoryStatus::Skipped => self.write(format_args!("      — skipped ({reason})\n")),
            StoryStatus::Pending => {}
        }
    }
}

/// Render a duration rounded to milliseconds, e.g. `320ms` or `1.25s`.
pub(crate) fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        let secs = ms as f64 / 1000.0;
        let text = format!("{secs:.3}");
        format!("{}s", text.trim_end_matches('0').trim_end_matches('.'))
    }
}
