//! Classification of the model's final free-text answer.

const FAILED_MARKER: &str = "FAILED:";
const PASSED_MARKER: &str = "PASSED";

/// Outcome the model reported for a story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed(String),
}

/// Parse a verdict, case-insensitively.
///
/// `FAILED:` wins over `PASSED` wherever both appear; its reason is the rest
/// of that line, trimmed. Text with neither marker fails with the whole
/// trimmed text as the reason. The scan is best-effort against free text.
pub fn parse_verdict(text: &str) -> Verdict {
    // ASCII upper-casing keeps byte offsets aligned with `text`.
    let upper = text.to_ascii_uppercase();
    if let Some(idx) = upper.find(FAILED_MARKER) {
        let rest = &text[idx + FAILED_MARKER.len()..];
        let line = rest.split('\n').next().unwrap_or_default();
        return Verdict::Failed(line.trim().to_string());
    }
    if upper.contains(PASSED_MARKER) {
        return Verdict::Passed;
    }
    Verdict::Failed(text.trim().to_string())
}
