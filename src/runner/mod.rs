//! Test runner strategies.
//!
//! Exactly one strategy runs the suite, chosen once from the configuration:
//! a custom `command`, the CLI behind a `command-prefix`, or the Cypress
//! module API driven through `node`.

mod cli;
mod command;
mod module;

pub use cli::CliPrefixRunner;
pub use command::CustomCommandRunner;
pub use module::{ModuleRunner, RESULTS_FILE_VAR, RUN_OPTIONS_VAR};

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::ActionConfig;
use crate::error::{Error, Result};
use crate::process::ProcessRunner;
use crate::results::RunOutcome;

/// Options forwarded to Cypress.
///
/// Serialized in camelCase for the module API; rendered as flags for the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    #[serde(skip_serializing_if = "is_false")]
    pub record: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub parallel: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub headless: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub quiet: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_build_id: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl RunOptions {
    /// Builds options from the configuration and the resolved build id.
    pub fn from_config(config: &ActionConfig, ci_build_id: Option<String>) -> Self {
        Self {
            record: config.record,
            parallel: config.parallel,
            headless: config.headless,
            quiet: config.quiet,
            group: config.group.clone(),
            tag: config.tag.clone(),
            spec: config.spec.clone(),
            project: config.project.clone(),
            config: config.config.clone(),
            config_file: config.config_file.clone(),
            browser: config.browser.clone(),
            env: config.env.clone(),
            ci_build_id,
        }
    }

    /// Renders the options as `cypress run` flags.
    pub fn cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        let switches = [
            (self.record, "--record"),
            (self.parallel, "--parallel"),
            (self.headless, "--headless"),
            (self.quiet, "--quiet"),
        ];
        for (enabled, flag) in switches {
            if enabled {
                args.push(flag.to_string());
            }
        }

        let valued = [
            ("--group", &self.group),
            ("--tag", &self.tag),
            ("--spec", &self.spec),
            ("--project", &self.project),
            ("--config", &self.config),
            ("--config-file", &self.config_file),
            ("--browser", &self.browser),
            ("--env", &self.env),
            ("--ci-build-id", &self.ci_build_id),
        ];
        for (flag, value) in valued {
            if let Some(value) = value {
                args.push(flag.to_string());
                args.push(value.clone());
            }
        }

        args
    }
}

/// Everything a strategy needs to run the suite.
#[derive(Debug, Clone)]
pub struct TestRunRequest {
    /// Directory holding the project.
    pub working_dir: PathBuf,
    /// Environment exported by earlier stages.
    pub env: Vec<(String, String)>,
    /// Cypress options.
    pub options: RunOptions,
}

/// Trait for test runner strategies.
#[async_trait]
pub trait TestRunner: Send + Sync {
    /// Runs the suite.
    ///
    /// A runner that cannot tell passing from failing tests reports
    /// [`RunOutcome::Unstructured`] and relies on the exit status.
    async fn run(&self, request: &TestRunRequest, processes: &dyn ProcessRunner)
        -> Result<RunOutcome>;

    /// Returns the name of this strategy.
    fn name(&self) -> &str;
}

/// Picks the strategy: `command` over `command-prefix` over the module API.
pub fn select_runner(config: &ActionConfig) -> Box<dyn TestRunner> {
    if let Some(command) = &config.command {
        return Box::new(CustomCommandRunner::new(command.clone()));
    }
    if let Some(prefix) = &config.command_prefix {
        return Box::new(CliPrefixRunner::new(prefix.clone()));
    }
    Box::new(ModuleRunner::new())
}

/// A failing test command is a test failure, not a tooling error.
fn as_test_failure(err: Error) -> Error {
    match err {
        Error::Subprocess { command, code } => Error::TestFailure(format!(
            "`{}` {}",
            command,
            match code {
                Some(code) => format!("exited with status {}", code),
                None => "was terminated by a signal".to_string(),
            }
        )),
        other => other,
    }
}
