//! Pattern matching collaborator.

use super::rule::Pattern;

/// Matches a compiled rule pattern against one extracted request value.
///
/// Hosts may plug in a different matching library; the evaluator only asks
/// whether a pattern matches.
pub trait PatternMatcher: Send + Sync {
    fn is_match(&self, pattern: &Pattern, input: &str) -> bool;

    /// Get the name of this matcher
    fn name(&self) -> &str;
}

/// `str:` as case-insensitive substring search, `rx:` via `regex`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMatcher;

impl PatternMatcher for DefaultMatcher {
    fn is_match(&self, pattern: &Pattern, input: &str) -> bool {
        match pattern {
            Pattern::Literal(needle) => {
                if needle.is_empty() {
                    true
                } else if input.is_ascii() && needle.is_ascii() {
                    input
                        .as_bytes()
                        .windows(needle.len())
                        .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
                } else {
                    input.to_lowercase().contains(needle.as_str())
                }
            }
            Pattern::Regex(regex) => regex.is_match(input),
        }
    }

    fn name(&self) -> &str {
        "default"
    }
}
