//! Cypress module API runner.
//!
//! `node` loads the project's own `cypress` package, runs it with the
//! serialized options, and writes the resolved results object to a file
//! that is parsed once the process exits.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::process::{CommandSpec, ProcessRunner};
use crate::results::{parse_module_results, RunOutcome};

use super::{as_test_failure, TestRunRequest, TestRunner};

/// Variable holding the JSON run options.
pub const RUN_OPTIONS_VAR: &str = "CYPRESS_RUN_OPTIONS";

/// Variable holding the path results are written to.
pub const RESULTS_FILE_VAR: &str = "CYPRESS_RESULTS_FILE";

const RUN_SCRIPT: &str = r#"
const fs = require('fs');
const write = (value) => fs.writeFileSync(process.env.CYPRESS_RESULTS_FILE, JSON.stringify(value));
const options = JSON.parse(process.env.CYPRESS_RUN_OPTIONS || '{}');
require('cypress')
  .run(options)
  .then(write)
  .catch((error) => {
    write({ status: 'failed', failures: 1, message: String((error && error.message) || error) });
  });
"#;

/// Runs the suite through `require('cypress').run()`.
pub struct ModuleRunner {
    node: String,
    results_dir: PathBuf,
}

impl Default for ModuleRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRunner {
    /// Creates a runner using `node` from `PATH` and the system temp dir.
    pub fn new() -> Self {
        Self {
            node: "node".to_string(),
            results_dir: std::env::temp_dir(),
        }
    }

    /// Writes result files under `dir`.
    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    fn results_path(&self) -> PathBuf {
        self.results_dir
            .join(format!("cypress-results-{}.json", uuid::Uuid::new_v4()))
    }
}

#[async_trait]
impl TestRunner for ModuleRunner {
    async fn run(
        &self,
        request: &TestRunRequest,
        processes: &dyn ProcessRunner,
    ) -> Result<RunOutcome> {
        let results_path = self.results_path();
        let options = serde_json::to_string(&request.options)?;

        let spec = CommandSpec::new(&self.node, &request.working_dir)
            .with_args(["-e", RUN_SCRIPT])
            .with_env(request.env.iter().cloned())
            .with_env([
                (RUN_OPTIONS_VAR.to_string(), options.clone()),
                (
                    RESULTS_FILE_VAR.to_string(),
                    results_path.display().to_string(),
                ),
            ]);

        tracing::info!(options = %options, "running cypress via module API");
        processes.run(&spec).await.map_err(as_test_failure)?;

        let json = match tokio::fs::read_to_string(&results_path).await {
            Ok(json) => json,
            Err(e) => {
                return Err(Error::TestFailure(format!(
                    "cypress exited without writing results to {}: {}",
                    results_path.display(),
                    e
                )))
            }
        };
        if let Err(e) = tokio::fs::remove_file(&results_path).await {
            tracing::debug!(path = ?results_path, error = %e, "failed to remove results file");
        }

        let results = parse_module_results(&json)?;
        tracing::info!(
            tests = results.total_tests,
            passed = results.total_passed,
            failed = results.total_failed,
            "cypress run finished"
        );
        Ok(RunOutcome::Structured(results))
    }

    fn name(&self) -> &str {
        "module"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::RecordingRunner;
    use crate::runner::RunOptions;
    use tempfile::TempDir;

    fn env_value<'a>(spec: &'a CommandSpec, name: &str) -> Option<&'a str> {
        spec.env
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn request(dir: &TempDir) -> TestRunRequest {
        TestRunRequest {
            working_dir: dir.path().to_path_buf(),
            env: vec![("TERM".to_string(), "xterm".to_string())],
            options: RunOptions {
                record: true,
                ci_build_id: Some("777-5001".to_string()),
                ..Default::default()
            },
        }
    }

    /// Stands in for node: writes `json` to the requested results file.
    fn writes_results(json: &'static str) -> RecordingRunner {
        RecordingRunner::with_hook(move |spec| {
            let path = env_value(spec, RESULTS_FILE_VAR).unwrap();
            std::fs::write(path, json)?;
            Ok(())
        })
    }

    #[tokio::test]
    async fn parses_results_written_by_node() {
        let dir = TempDir::new().unwrap();
        let processes = writes_results(
            r#"{"totalTests": 2, "totalPassed": 2, "totalFailed": 0, "totalDuration": 1500,
                "runUrl": "https://cloud.cypress.io/runs/9",
                "runs": [{"spec": {"name": "a.cy.js"}, "stats": {"tests": 2, "passes": 2, "duration": 1500}}]}"#,
        );
        let runner = ModuleRunner::new().with_results_dir(dir.path());

        let outcome = runner.run(&request(&dir), &processes).await.unwrap();

        let results = outcome.results().unwrap();
        assert_eq!(results.total_tests, 2);
        assert_eq!(results.run_url.as_deref(), Some("https://cloud.cypress.io/runs/9"));
        assert_eq!(results.runs[0].spec_name, "a.cy.js");

        // results file is cleaned up
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn passes_options_and_environment_to_node() {
        let dir = TempDir::new().unwrap();
        let processes = writes_results(r#"{"totalTests": 0}"#);
        let runner = ModuleRunner::new().with_results_dir(dir.path());

        runner.run(&request(&dir), &processes).await.unwrap();

        let spec = &processes.recorded()[0];
        assert_eq!(spec.executable, "node");
        assert_eq!(spec.args[0], "-e");
        assert!(spec.args[1].contains("require('cypress')"));
        assert_eq!(env_value(spec, "TERM"), Some("xterm"));

        let options: serde_json::Value =
            serde_json::from_str(env_value(spec, RUN_OPTIONS_VAR).unwrap()).unwrap();
        assert_eq!(options["record"], true);
        assert_eq!(options["ciBuildId"], "777-5001");
    }

    #[tokio::test]
    async fn cypress_launch_failure_is_a_test_failure() {
        let dir = TempDir::new().unwrap();
        let processes = writes_results(
            r#"{"status": "failed", "failures": 1, "message": "Cypress verification timed out"}"#,
        );
        let runner = ModuleRunner::new().with_results_dir(dir.path());

        let err = runner.run(&request(&dir), &processes).await.unwrap_err();
        assert!(matches!(err, Error::TestFailure(ref m) if m.contains("verification timed out")));
    }

    #[tokio::test]
    async fn missing_results_file_is_a_test_failure() {
        let dir = TempDir::new().unwrap();
        let processes = RecordingRunner::default();
        let runner = ModuleRunner::new().with_results_dir(dir.path());

        let err = runner.run(&request(&dir), &processes).await.unwrap_err();
        assert!(matches!(err, Error::TestFailure(ref m) if m.contains("without writing results")));
    }
}
