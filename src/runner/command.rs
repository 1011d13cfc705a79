//! Custom test command.

use async_trait::async_trait;

use crate::error::Result;
use crate::process::{CommandSpec, ProcessRunner};
use crate::results::RunOutcome;

use super::{as_test_failure, TestRunRequest, TestRunner};

/// Runs the user's `command` verbatim. Cypress options are not forwarded.
pub struct CustomCommandRunner {
    command: String,
}

impl CustomCommandRunner {
    /// Creates a runner for `command`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl TestRunner for CustomCommandRunner {
    async fn run(
        &self,
        request: &TestRunRequest,
        processes: &dyn ProcessRunner,
    ) -> Result<RunOutcome> {
        let spec = CommandSpec::parse(&self.command, &request.working_dir)?
            .with_env(request.env.iter().cloned());

        tracing::info!(command = %spec.display(), "running custom test command");
        processes.run(&spec).await.map_err(as_test_failure)?;

        Ok(RunOutcome::Unstructured)
    }

    fn name(&self) -> &str {
        "custom-command"
    }
}
