//! Utility modules: retry, timeout, text truncation.

pub mod retry;
pub mod timeout;

/// Truncate `text` to at most `max` characters, ending with `...` when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if max <= 3 || text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max - 3).collect();
    out.push_str("...");
    out
}
