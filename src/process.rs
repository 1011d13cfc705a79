//! Subprocess execution.
//!
//! Commands are either awaited to completion or started and left running in
//! the background. Arguments are always passed as a vector; nothing is ever
//! re-joined into a shell string.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::tokenize::tokenize;

/// A single command to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name or path.
    pub executable: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Directory the command runs in.
    pub working_dir: PathBuf,
    /// Whether the caller waits for the command to exit.
    pub wait_for_completion: bool,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Creates an awaited command with no arguments.
    pub fn new(executable: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            wait_for_completion: true,
            env: Vec::new(),
        }
    }

    /// Parses a shell-like command line into an awaited command.
    pub fn parse(command_line: &str, working_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut tokens = tokenize(command_line)?.into_iter();
        let executable = tokens
            .next()
            .ok_or_else(|| Error::Config("command cannot be empty".to_string()))?;
        Ok(Self::new(executable, working_dir).with_args(tokens))
    }

    /// Appends arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds environment variables.
    pub fn with_env<I>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(env);
        self
    }

    /// Marks the command as fire-and-forget.
    pub fn detached(mut self) -> Self {
        self.wait_for_completion = false;
        self
    }

    /// Renders the command line for logs and error messages.
    ///
    /// An executable path containing spaces is quoted so the line can be
    /// pasted into a shell.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        if self.executable.contains(' ') {
            parts.push(format!("\"{}\"", self.executable));
        } else {
            parts.push(self.executable.clone());
        }
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Handle for a process started without waiting.
///
/// The process is not supervised: nothing stops it, and it runs until it
/// exits on its own or the CI job tears down the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedProcess {
    /// OS process id, when the platform reports one.
    pub pid: Option<u32>,
    /// Rendered command line.
    pub command_line: String,
}

/// Outcome of [`ProcessRunner::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// The command ran to a successful exit.
    Completed,
    /// The command was started and left running.
    Detached(DetachedProcess),
}

/// Trait for subprocess runners.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs the command and waits for it to exit.
    ///
    /// A non-zero exit is reported as [`Error::Subprocess`].
    async fn run(&self, command: &CommandSpec) -> Result<()>;

    /// Starts the command and returns without waiting for it.
    async fn start(&self, command: &CommandSpec) -> Result<DetachedProcess>;

    /// Runs or starts the command depending on `wait_for_completion`.
    async fn execute(&self, command: &CommandSpec) -> Result<Execution> {
        if command.wait_for_completion {
            self.run(command).await?;
            Ok(Execution::Completed)
        } else {
            Ok(Execution::Detached(self.start(command).await?))
        }
    }
}

/// Runner that executes commands on the host.
#[derive(Debug, Default, Clone)]
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    /// Creates a new host runner.
    pub fn new() -> Self {
        Self
    }

    /// Resolves an executable against `PATH` (and `PATHEXT` on Windows).
    ///
    /// Paths containing a separator are checked directly, relative paths
    /// against `working_dir`.
    pub fn resolve(executable: &str, working_dir: &Path) -> Result<PathBuf> {
        let candidate = Path::new(executable);
        if candidate.components().count() > 1 {
            let full = if candidate.is_absolute() {
                candidate.to_path_buf()
            } else {
                working_dir.join(candidate)
            };
            return if full.exists() {
                Ok(full)
            } else {
                Err(Error::ToolNotFound {
                    tool: executable.to_string(),
                })
            };
        }

        which::which(executable).map_err(|_| Error::ToolNotFound {
            tool: executable.to_string(),
        })
    }

    fn build(&self, command: &CommandSpec) -> Result<Command> {
        let program = Self::resolve(&command.executable, &command.working_dir)?;
        let mut cmd = Command::new(program);
        cmd.args(&command.args)
            .current_dir(&command.working_dir)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        Ok(cmd)
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, command: &CommandSpec) -> Result<()> {
        let mut cmd = self.build(command)?;
        let command_line = command.display();

        tracing::info!(
            command = %command_line,
            working_dir = ?command.working_dir,
            "running command"
        );

        let status = cmd.status().await?;
        if !status.success() {
            return Err(Error::Subprocess {
                command: command_line,
                code: status.code(),
            });
        }

        tracing::debug!(command = %command_line, "command finished");
        Ok(())
    }

    async fn start(&self, command: &CommandSpec) -> Result<DetachedProcess> {
        let mut cmd = self.build(command)?;
        let command_line = command.display();

        tracing::info!(
            command = %command_line,
            working_dir = ?command.working_dir,
            "starting background command"
        );

        let mut child = cmd.spawn()?;
        let pid = child.id();

        // Reap the child when it exits; the pipeline never waits on it.
        let reaped_line = command_line.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => {
                    tracing::debug!(command = %reaped_line, ?status, "background command exited")
                }
                Err(e) => {
                    tracing::warn!(command = %reaped_line, error = %e, "failed to wait for background command")
                }
            }
        });

        Ok(DetachedProcess { pid, command_line })
    }
}
