//! `cypress run` through a command prefix.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::process::{CommandSpec, ProcessRunner};
use crate::results::RunOutcome;
use crate::tokenize::tokenize;

use super::{as_test_failure, TestRunRequest, TestRunner};

/// Runs `<prefix> npx cypress run <flags>`, for wrappers such as
/// `percy exec --` that must own the test process.
pub struct CliPrefixRunner {
    prefix: String,
}

impl CliPrefixRunner {
    /// Creates a runner behind `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn command(&self, request: &TestRunRequest) -> Result<CommandSpec> {
        let mut tokens = tokenize(&self.prefix)?.into_iter();
        let executable = tokens
            .next()
            .ok_or_else(|| Error::Config("command-prefix cannot be empty".to_string()))?;

        Ok(CommandSpec::new(executable, &request.working_dir)
            .with_args(tokens)
            .with_args(["npx", "cypress", "run"])
            .with_args(request.options.cli_args())
            .with_env(request.env.iter().cloned()))
    }
}

#[async_trait]
impl TestRunner for CliPrefixRunner {
    async fn run(
        &self,
        request: &TestRunRequest,
        processes: &dyn ProcessRunner,
    ) -> Result<RunOutcome> {
        let spec = self.command(request)?;

        tracing::info!(command = %spec.display(), "running cypress through command prefix");
        processes.run(&spec).await.map_err(as_test_failure)?;

        Ok(RunOutcome::Unstructured)
    }

    fn name(&self) -> &str {
        "command-prefix"
    }
}
