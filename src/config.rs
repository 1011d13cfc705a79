//! Action configuration.
//!
//! Inputs arrive as `INPUT_<NAME>` environment variables (the GitHub Actions
//! convention) or, for local runs, as a TOML file with the same kebab-case
//! names. The resulting [`ActionConfig`] is immutable and threaded through
//! every pipeline stage.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Login of the bot that authors report comments by default.
pub const DEFAULT_BOT_LOGIN: &str = "github-actions[bot]";

/// Every input name the action understands.
pub const KNOWN_INPUTS: &[&str] = &[
    "working-directory",
    "cache-key",
    "cache-dir",
    "install",
    "install-command",
    "build",
    "start",
    "start-windows",
    "wait-on",
    "wait-on-timeout",
    "run-tests",
    "command",
    "command-prefix",
    "headless",
    "record",
    "parallel",
    "quiet",
    "group",
    "tag",
    "spec",
    "project",
    "config",
    "config-file",
    "ci-build-id",
    "browser",
    "env",
    "github-token",
    "github-user-login",
    "comment-on-pull-request",
];

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

/// All action inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ActionConfig {
    /// Directory holding `package.json`, relative to the workspace.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    /// Verbatim primary key for both caches.
    #[serde(default)]
    pub cache_key: Option<String>,
    /// Root directory of the local cache store.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub install: bool,
    /// Replaces `npm ci` / `yarn --frozen-lockfile`.
    #[serde(default)]
    pub install_command: Option<String>,
    #[serde(default)]
    pub build: Option<String>,
    /// Comma-separated commands started in the background.
    #[serde(default)]
    pub start: Option<String>,
    /// Used instead of `start` on Windows runners.
    #[serde(default)]
    pub start_windows: Option<String>,
    /// Comma-separated URLs to wait for.
    #[serde(default)]
    pub wait_on: Option<String>,
    /// Seconds to wait for each `wait-on` URL.
    #[serde(default = "default_wait_on_timeout")]
    pub wait_on_timeout: u64,
    #[serde(default = "default_true")]
    pub run_tests: bool,
    /// Full custom test command; takes precedence over everything else.
    #[serde(default)]
    pub command: Option<String>,
    /// Prefix placed before `npx cypress run`.
    #[serde(default)]
    pub command_prefix: Option<String>,
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub record: bool,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub quiet: bool,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub spec: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub config: Option<String>,
    #[serde(default)]
    pub config_file: Option<String>,
    /// Explicit build id; skips build identity resolution.
    #[serde(default)]
    pub ci_build_id: Option<String>,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub github_token: Option<String>,
    #[serde(default = "default_bot_login")]
    pub github_user_login: String,
    #[serde(default)]
    pub comment_on_pull_request: bool,
}

fn default_true() -> bool {
    true
}

fn default_wait_on_timeout() -> u64 {
    60
}

fn default_bot_login() -> String {
    DEFAULT_BOT_LOGIN.to_string()
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            working_directory: None,
            cache_key: None,
            cache_dir: None,
            install: true,
            install_command: None,
            build: None,
            start: None,
            start_windows: None,
            wait_on: None,
            wait_on_timeout: default_wait_on_timeout(),
            run_tests: true,
            command: None,
            command_prefix: None,
            headless: false,
            record: false,
            parallel: false,
            quiet: false,
            group: None,
            tag: None,
            spec: None,
            project: None,
            config: None,
            config_file: None,
            ci_build_id: None,
            browser: None,
            env: None,
            github_token: None,
            github_user_login: default_bot_login(),
            comment_on_pull_request: false,
        }
    }
}

impl ActionConfig {
    /// Reads inputs from `INPUT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_inputs(|name| std::env::var(input_env_name(name)).ok())
    }

    /// Reads inputs through `lookup`, keyed by kebab-case input name.
    ///
    /// Empty values count as unset.
    pub fn from_inputs<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let flag = |name: &str, default: bool| -> Result<bool> {
            match text(name) {
                Some(value) => parse_bool(name, &value),
                None => Ok(default),
            }
        };

        let defaults = Self::default();
        let wait_on_timeout = match text("wait-on-timeout") {
            Some(value) => value.parse::<u64>().map_err(|_| {
                Error::Config(format!(
                    "input 'wait-on-timeout' must be a whole number of seconds, got '{}'",
                    value
                ))
            })?,
            None => defaults.wait_on_timeout,
        };

        Ok(Self {
            working_directory: text("working-directory").map(PathBuf::from),
            cache_key: text("cache-key"),
            cache_dir: text("cache-dir").map(PathBuf::from),
            install: flag("install", defaults.install)?,
            install_command: text("install-command"),
            build: text("build"),
            start: text("start"),
            start_windows: text("start-windows"),
            wait_on: text("wait-on"),
            wait_on_timeout,
            run_tests: flag("run-tests", defaults.run_tests)?,
            command: text("command"),
            command_prefix: text("command-prefix"),
            headless: flag("headless", defaults.headless)?,
            record: flag("record", defaults.record)?,
            parallel: flag("parallel", defaults.parallel)?,
            quiet: flag("quiet", defaults.quiet)?,
            group: text("group"),
            tag: text("tag"),
            spec: text("spec"),
            project: text("project"),
            config: text("config"),
            config_file: text("config-file"),
            ci_build_id: text("ci-build-id"),
            browser: text("browser"),
            env: text("env"),
            github_token: text("github-token"),
            github_user_login: text("github-user-login").unwrap_or(defaults.github_user_login),
            comment_on_pull_request: flag(
                "comment-on-pull-request",
                defaults.comment_on_pull_request,
            )?,
        })
    }

    /// Parses a TOML document using the kebab-case input names.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid config file: {}", e)))
    }

    /// Loads a TOML config file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// True when tests run as parallel or grouped shards.
    pub fn wants_build_identity(&self) -> bool {
        self.parallel || self.group.is_some()
    }
}

impl Validate for ActionConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.wait_on.is_some() && self.wait_on_timeout == 0 {
            result.add_error("wait-on-timeout must be greater than zero");
        }

        if self.github_user_login.trim().is_empty() {
            result.add_error("github-user-login cannot be empty");
        }

        if self.command.is_some() && self.command_prefix.is_some() {
            result.add_warning("both command and command-prefix are set; command-prefix is ignored");
        }

        if self.parallel && !self.record {
            result.add_warning("parallel runs require record; Cypress will reject --parallel");
        }

        if self.comment_on_pull_request && self.github_token.is_none() {
            result.add_warning("comment-on-pull-request is enabled but github-token is not set");
        }

        if !self.run_tests && self.comment_on_pull_request {
            result.add_warning("comment-on-pull-request has no effect when run-tests is false");
        }

        result
    }
}

/// Environment variable name for an input, e.g. `wait-on` -> `INPUT_WAIT-ON`.
pub fn input_env_name(name: &str) -> String {
    format!("INPUT_{}", name.replace(' ', "_").to_uppercase())
}

/// Returns the `INPUT_*` variables among `env_names` that match no known input.
pub fn unknown_inputs<I>(env_names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let known: Vec<String> = KNOWN_INPUTS.iter().map(|name| input_env_name(name)).collect();
    let mut unknown: Vec<String> = env_names
        .into_iter()
        .filter(|name| name.starts_with("INPUT_") && !known.contains(name))
        .collect();
    unknown.sort();
    unknown
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "True" | "TRUE" => Ok(true),
        "false" | "False" | "FALSE" => Ok(false),
        other => Err(Error::Config(format!(
            "input '{}' must be true or false, got '{}'",
            name, other
        ))),
    }
}
