//! The CI pipeline.
//!
//! Stages run strictly in order: install, build, start, wait-on, run-tests,
//! report. Each may be a no-op. The first failing stage ends the run and the
//! remaining stages are skipped.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheKeyDeriver, CacheRestore, CacheSave, CacheStore, Lockfile};
use crate::config::ActionConfig;
use crate::context::CiContext;
use crate::error::{Error, Result};
use crate::format::ResultFormatter;
use crate::github::RepoApi;
use crate::identity::BuildIdentityResolver;
use crate::outputs::ActionOutputs;
use crate::poll::NetworkPoller;
use crate::process::{CommandSpec, Execution, ProcessRunner};
use crate::report::{ReportPublisher, ReportSettings};
use crate::results::RunOutcome;
use crate::runner::{select_runner, RunOptions, TestRunRequest, TestRunner};
use crate::tokenize::split_list;
use crate::workdir::WorkingDirGuard;

/// Step output holding the recorded run URL.
pub const DASHBOARD_URL_OUTPUT: &str = "dashboardUrl";

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Install,
    Build,
    Start,
    WaitOn,
    RunTests,
    Report,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Stage; 6] = [
        Stage::Install,
        Stage::Build,
        Stage::Start,
        Stage::WaitOn,
        Stage::RunTests,
        Stage::Report,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Install => "install",
            Stage::Build => "build",
            Stage::Start => "start",
            Stage::WaitOn => "wait-on",
            Stage::RunTests => "run-tests",
            Stage::Report => "report",
        };
        write!(f, "{}", name)
    }
}

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalState {
    Done,
    Failed(Stage),
}

/// What a pipeline run did.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    /// Stages that finished, including no-ops.
    pub completed: Vec<Stage>,
    /// The stage that failed and why.
    pub failure: Option<(Stage, Error)>,
    /// Value of the `dashboardUrl` output, when set.
    pub dashboard_url: Option<String>,
    /// Outcome of the test stage, when it ran to completion.
    pub run_outcome: Option<RunOutcome>,
}

impl PipelineOutcome {
    /// Done, or the failed stage.
    pub fn final_state(&self) -> FinalState {
        match &self.failure {
            Some((stage, _)) => FinalState::Failed(*stage),
            None => FinalState::Done,
        }
    }

    /// Process exit code: 0 on success, 1 on failure.
    pub fn exit_code(&self) -> i32 {
        match self.failure {
            Some(_) => 1,
            None => 0,
        }
    }
}

/// Drives the pipeline.
pub struct TestOrchestrator {
    config: ActionConfig,
    context: CiContext,
    processes: Arc<dyn ProcessRunner>,
    cache: Arc<dyn CacheStore>,
    api: Option<Arc<dyn RepoApi>>,
    poller: NetworkPoller,
    runner: Box<dyn TestRunner>,
    outputs: ActionOutputs,
}

impl TestOrchestrator {
    /// Creates an orchestrator. `api` is `None` when no credential is
    /// available.
    pub fn new(
        config: ActionConfig,
        context: CiContext,
        processes: Arc<dyn ProcessRunner>,
        cache: Arc<dyn CacheStore>,
        api: Option<Arc<dyn RepoApi>>,
    ) -> Self {
        let runner = select_runner(&config);
        let outputs = ActionOutputs::new(context.output_file.clone(), context.env_file.clone());
        Self {
            config,
            context,
            processes,
            cache,
            api,
            poller: NetworkPoller::new(),
            runner,
            outputs,
        }
    }

    /// Replaces the test runner strategy chosen from the configuration.
    pub fn with_runner(mut self, runner: Box<dyn TestRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Replaces the readiness poller.
    pub fn with_poller(mut self, poller: NetworkPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Outputs and exported variables written so far.
    pub fn outputs(&self) -> &ActionOutputs {
        &self.outputs
    }

    /// Runs every stage, stopping at the first failure.
    pub async fn run(&mut self) -> PipelineOutcome {
        let working_dir = self
            .context
            .working_dir(self.config.working_directory.as_deref());
        let mut outcome = PipelineOutcome::default();

        tracing::info!(
            working_dir = ?working_dir,
            runner = %self.runner.name(),
            cache = %self.cache.name(),
            "starting pipeline"
        );

        for stage in Stage::ALL {
            tracing::info!(stage = %stage, "entering stage");

            let result = match stage {
                Stage::Install => match self.export_environment() {
                    Ok(()) => self.install(&working_dir).await,
                    Err(e) => Err(e),
                },
                Stage::Build => self.build(&working_dir).await,
                Stage::Start => self.start(&working_dir).await,
                Stage::WaitOn => self.wait_on().await,
                Stage::RunTests => self.run_tests(&working_dir).await.map(|run| {
                    outcome.run_outcome = run;
                }),
                Stage::Report => self.report(outcome.run_outcome.as_ref()).await,
            };

            match result {
                Ok(()) => outcome.completed.push(stage),
                Err(e) => {
                    tracing::error!(stage = %stage, error = %e, "stage failed");
                    outcome.failure = Some((stage, e));
                    break;
                }
            }
        }

        outcome.dashboard_url = self.outputs.output(DASHBOARD_URL_OUTPUT).map(str::to_string);
        outcome
    }

    /// Variables every spawned command receives.
    fn export_environment(&mut self) -> Result<()> {
        let cypress_cache = self.context.cache_paths.cypress.display().to_string();
        let npm_cache = self.context.cache_paths.npm.display().to_string();

        self.outputs.export_variable("CI", "1")?;
        self.outputs
            .export_variable("CYPRESS_CACHE_FOLDER", &cypress_cache)?;
        self.outputs.export_variable("npm_config_cache", &npm_cache)?;
        self.outputs.export_variable("TERM", "xterm")?;
        Ok(())
    }

    fn env(&self) -> Vec<(String, String)> {
        self.outputs.exported().to_vec()
    }

    fn command(&self, command_line: &str, working_dir: &Path) -> Result<CommandSpec> {
        Ok(CommandSpec::parse(command_line, working_dir)?.with_env(self.env()))
    }

    fn npx(&self, args: &[&str], working_dir: &Path) -> CommandSpec {
        CommandSpec::new("npx", working_dir)
            .with_args(args.iter().copied())
            .with_env(self.env())
    }

    async fn install(&mut self, working_dir: &Path) -> Result<()> {
        if !self.config.install {
            tracing::info!("install disabled, skipping");
            return Ok(());
        }

        let lockfile = Lockfile::detect(working_dir).ok_or_else(|| {
            Error::Config(format!(
                "no yarn.lock or package-lock.json found for {}",
                working_dir.display()
            ))
        })?;
        let lockfile_hash = lockfile.hash()?;

        let deriver = CacheKeyDeriver::new(
            self.context.platform_arch.clone(),
            self.context.cache_paths.clone(),
        )
        .with_override(self.config.cache_key.clone());
        let dependencies = deriver.dependency_cache(lockfile.tool, &lockfile_hash);
        let binary = deriver.binary_cache(&lockfile_hash);

        let (dependencies_restore, binary_restore) = tokio::join!(
            self.cache.restore(&dependencies),
            self.cache.restore(&binary)
        );
        log_restore("dependencies", &dependencies_restore);
        log_restore("binary", &binary_restore);

        let installer = match &self.config.install_command {
            Some(command) => self.command(command, working_dir)?,
            None => CommandSpec::new(lockfile.tool.as_str(), working_dir)
                .with_args(lockfile.tool.install_args().iter().copied())
                .with_env(self.env()),
        };
        tracing::info!(tool = %lockfile.tool, lockfile = ?lockfile.path, "installing dependencies");
        self.processes.run(&installer).await?;

        self.processes
            .run(&self.npx(&["cypress", "cache", "list"], working_dir))
            .await?;

        if dependencies_restore.is_hit() && binary_restore.is_hit() {
            tracing::info!("both caches restored, skipping verify and save");
            return Ok(());
        }

        self.processes
            .run(&self.npx(&["cypress", "verify"], working_dir))
            .await?;

        let (dependencies_save, binary_save) =
            tokio::join!(self.cache.save(&dependencies), self.cache.save(&binary));
        log_save("dependencies", &dependencies_save);
        log_save("binary", &binary_save);

        Ok(())
    }

    async fn build(&self, working_dir: &Path) -> Result<()> {
        let Some(build) = &self.config.build else {
            return Ok(());
        };
        let command = self.command(build, working_dir)?;
        tracing::info!(command = %command.display(), "building application");
        self.processes.run(&command).await
    }

    async fn start(&self, working_dir: &Path) -> Result<()> {
        let start = match (&self.config.start_windows, &self.config.start) {
            (Some(windows), _) if self.context.is_windows => windows,
            (_, Some(start)) => start,
            _ => return Ok(()),
        };

        for command_line in split_list(start) {
            let command = self.command(&command_line, working_dir)?.detached();
            if let Execution::Detached(process) = self.processes.execute(&command).await? {
                tracing::info!(
                    command = %process.command_line,
                    pid = ?process.pid,
                    "started server"
                );
            }
        }
        Ok(())
    }

    async fn wait_on(&self) -> Result<()> {
        let Some(wait_on) = &self.config.wait_on else {
            return Ok(());
        };
        let timeout = Duration::from_secs(self.config.wait_on_timeout);
        for url in split_list(wait_on) {
            self.poller.poll_until_ready(&url, timeout).await?;
        }
        Ok(())
    }

    async fn run_tests(&mut self, working_dir: &Path) -> Result<Option<RunOutcome>> {
        if !self.config.run_tests {
            tracing::info!("run-tests disabled, skipping");
            return Ok(None);
        }

        let _guard = WorkingDirGuard::enter(working_dir)?;

        let ci_build_id = match &self.config.ci_build_id {
            Some(id) => Some(id.clone()),
            None if self.config.wants_build_identity() => {
                let identity = BuildIdentityResolver::new(&self.context, self.api.clone())
                    .resolve()
                    .await;
                if let Some(branch) = &identity.branch {
                    self.outputs.export_variable("GH_BRANCH", branch)?;
                }
                Some(identity.parallel_id)
            }
            None => None,
        };

        let request = TestRunRequest {
            working_dir: working_dir.to_path_buf(),
            env: self.env(),
            options: RunOptions::from_config(&self.config, ci_build_id),
        };
        let run = self
            .runner
            .run(&request, self.processes.as_ref())
            .await?;

        if let Some(results) = run.results() {
            tracing::info!("\n{}", ResultFormatter::new().format(results));
            self.outputs.set_output(
                DASHBOARD_URL_OUTPUT,
                results.run_url.as_deref().unwrap_or_default(),
            )?;

            if results.total_failed > 0 {
                return Err(Error::TestFailure(format!(
                    "{} of {} tests failed",
                    results.total_failed, results.total_tests
                )));
            }
        }

        Ok(Some(run))
    }

    async fn report(&self, run: Option<&RunOutcome>) -> Result<()> {
        let Some(run) = run else {
            return Ok(());
        };

        let publisher = ReportPublisher::new(
            ReportSettings {
                enabled: self.config.comment_on_pull_request,
                repository: self.context.repository.clone(),
                pull_request: self.context.pull_request,
                bot_login: self.config.github_user_login.clone(),
            },
            self.api.clone(),
        );
        publisher.publish(run).await?;
        Ok(())
    }
}

fn log_restore(cache: &str, restore: &CacheRestore) {
    match restore {
        CacheRestore::Hit { key, exact } => {
            tracing::info!(cache, key = %key, exact, "cache restored")
        }
        CacheRestore::Miss { reason } => {
            tracing::info!(cache, reason = %reason, "cache not restored")
        }
    }
}

fn log_save(cache: &str, save: &CacheSave) {
    match save {
        CacheSave::Saved { key } => tracing::info!(cache, key = %key, "cache saved"),
        CacheSave::Skipped { reason } => {
            tracing::info!(cache, reason = %reason, "cache not saved")
        }
    }
}
