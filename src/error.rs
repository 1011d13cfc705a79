//! Error types for the cypress-ci orchestrator.

use thiserror::Error;

/// Top-level error type for pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Executable could not be found on the system path.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// A subprocess exited unsuccessfully.
    #[error("command `{command}` failed with {}", exit_description(.code))]
    Subprocess { command: String, code: Option<i32> },

    /// Cache restore or save failed. Never escapes a cache store.
    #[error("cache error: {0}")]
    Cache(String),

    /// A readiness probe never succeeded.
    #[error("timed out after {timeout_secs}s waiting for {url}")]
    PollTimeout { url: String, timeout_secs: u64 },

    /// GitHub API operation failed.
    #[error("GitHub operation failed: {0}")]
    GitHub(String),

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Tests ran but did not pass, or the runner reported a failure.
    #[error("test failure: {0}")]
    TestFailure(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subprocess_error_mentions_exit_code() {
        let err = Error::Subprocess {
            command: "npm ci".to_string(),
            code: Some(2),
        };
        assert_eq!(err.to_string(), "command `npm ci` failed with exit code 2");
    }

    #[test]
    fn subprocess_error_without_code_mentions_signal() {
        let err = Error::Subprocess {
            command: "npm start".to_string(),
            code: None,
        };
        assert!(err.to_string().contains("signal"));
    }

    #[test]
    fn poll_timeout_names_url() {
        let err = Error::PollTimeout {
            url: "http://localhost:3000".to_string(),
            timeout_secs: 60,
        };
        assert!(err.to_string().contains("http://localhost:3000"));
        assert!(err.to_string().contains("60s"));
    }
}
