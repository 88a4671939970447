//! Utility functions shared across modules

use std::time::Duration;

/// Collapse all runs of whitespace into single spaces and trim the ends.
pub fn compact_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max_chars` characters, never splitting a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Rough token estimate for prompt accounting: whitespace-separated words
/// times 1.3. Deliberately cheap; metrics only, never a hard limit.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.split_whitespace().count() as f64 * 1.3) as u64
}

/// Format a duration for log and report output (e.g. `340ms`, `2.45s`).
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_whitespace() {
        assert_eq!(compact_whitespace("  a \n\t b  c "), "a b c");
        assert_eq!(compact_whitespace(""), "");
        assert_eq!(compact_whitespace("single"), "single");
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        // Multi-byte characters are kept whole.
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("one two three four"), 5); // 4 * 1.3 = 5.2
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(340)), "340ms");
        assert_eq!(format_duration(Duration::from_millis(2450)), "2.45s");
    }
}
