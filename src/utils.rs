//! Small helpers shared across modules.

use regex::Regex;

/// Compiles a regex literal that is known to be valid at build time.
///
/// # Panics
///
/// Panics if the pattern is invalid, which only happens if a literal in this
/// crate is edited incorrectly.
#[must_use]
pub(crate) fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Compiles a CSS selector literal that is known to be valid at build time.
///
/// # Panics
///
/// Panics if the selector is invalid.
#[must_use]
pub(crate) fn compile_static_selector(selector: &str) -> scraper::Selector {
    scraper::Selector::parse(selector)
        .unwrap_or_else(|e| panic!("invalid static selector '{selector}': {e:?}"))
}
