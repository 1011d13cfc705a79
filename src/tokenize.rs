//! Splitting of shell-like command strings into argument vectors.

use crate::error::{Error, Result};

/// Splits a command string into tokens, honouring single and double quotes
/// and backslash escapes.
///
/// Returns an error for unterminated quotes. An empty or whitespace-only
/// string yields an empty vector.
pub fn tokenize(command: &str) -> Result<Vec<String>> {
    shell_words::split(command)
        .map_err(|e| Error::Config(format!("cannot parse command `{}`: {}", command, e)))
}

/// Splits a comma-separated input (used by `start` and `wait-on`) into
/// trimmed, non-empty entries.
pub fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
