//! Test results produced by the run-tests stage.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Results of one spec file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub spec_name: String,
    pub wall_clock_duration_ms: u64,
    pub test_count: u64,
    pub pass_count: u64,
    pub fail_count: u64,
    pub skip_count: u64,
}

/// Aggregated results of a test run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TestResults {
    pub runs: Vec<RunResult>,
    pub total_tests: u64,
    pub total_passed: u64,
    pub total_failed: u64,
    pub total_skipped: u64,
    /// Total duration in milliseconds.
    pub total_duration: u64,
    /// Recorded run on the dashboard, when recording.
    pub run_url: Option<String>,
    pub cypress_version: Option<String>,
}

/// What a test runner strategy produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Parsed results from the module API.
    Structured(TestResults),
    /// The command succeeded but produced no structured data (custom command
    /// and CLI modes).
    Unstructured,
}

impl RunOutcome {
    /// Structured results, if any.
    pub fn results(&self) -> Option<&TestResults> {
        match self {
            RunOutcome::Structured(results) => Some(results),
            RunOutcome::Unstructured => None,
        }
    }
}

// Shapes of the JSON written by the Cypress module API. Older releases put
// `wallClockDuration` in the run stats, newer ones only `duration`.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResults {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    failures: Option<u64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    runs: Vec<RawRun>,
    #[serde(default)]
    total_tests: u64,
    #[serde(default)]
    total_passed: u64,
    #[serde(default)]
    total_failed: u64,
    #[serde(default)]
    total_skipped: u64,
    #[serde(default)]
    total_duration: u64,
    #[serde(default)]
    run_url: Option<String>,
    #[serde(default)]
    cypress_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRun {
    spec: RawSpec,
    stats: RawStats,
}

#[derive(Debug, Deserialize)]
struct RawSpec {
    #[serde(default)]
    name: String,
    #[serde(default)]
    relative: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStats {
    #[serde(default)]
    tests: u64,
    #[serde(default)]
    passes: u64,
    #[serde(default)]
    failures: u64,
    #[serde(default)]
    skipped: u64,
    #[serde(default)]
    wall_clock_duration: Option<u64>,
    #[serde(default)]
    duration: Option<u64>,
}

/// Parses the JSON the Cypress module API resolves with.
///
/// A `failures` field together with a `message` and no runs means Cypress
/// itself could not run; that is reported as [`Error::TestFailure`].
pub fn parse_module_results(json: &str) -> Result<TestResults> {
    let raw: RawResults = serde_json::from_str(json)?;

    if raw.status.as_deref() == Some("failed") || (raw.failures.is_some() && raw.runs.is_empty())
    {
        let message = raw
            .message
            .unwrap_or_else(|| "Cypress could not run the tests".to_string());
        return Err(Error::TestFailure(match raw.failures {
            Some(count) => format!("{} (failures: {})", message, count),
            None => message,
        }));
    }

    let runs = raw
        .runs
        .into_iter()
        .map(|run| RunResult {
            spec_name: run.spec.relative.unwrap_or(run.spec.name),
            wall_clock_duration_ms: run
                .stats
                .wall_clock_duration
                .or(run.stats.duration)
                .unwrap_or_default(),
            test_count: run.stats.tests,
            pass_count: run.stats.passes,
            fail_count: run.stats.failures,
            skip_count: run.stats.skipped,
        })
        .collect();

    Ok(TestResults {
        runs,
        total_tests: raw.total_tests,
        total_passed: raw.total_passed,
        total_failed: raw.total_failed,
        total_skipped: raw.total_skipped,
        total_duration: raw.total_duration,
        run_url: raw.run_url.filter(|url| !url.is_empty()),
        cypress_version: raw.cypress_version,
    })
}
