//! cypress-ci - end-to-end test orchestration for CI jobs
//!
//! This library installs dependencies with cached package and binary folders,
//! builds and starts the application under test, waits for it to come up,
//! runs the Cypress suite and reports the results on the pull request.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod format;
pub mod github;
pub mod identity;
pub mod outputs;
pub mod pipeline;
pub mod poll;
pub mod process;
pub mod report;
pub mod results;
pub mod runner;
pub mod tokenize;
pub mod workdir;

pub use error::{Error, Result};

pub use cache::{
    CacheDescriptor, CacheKeyDeriver, CacheRestore, CacheSave, CacheStore, DirCacheStore,
    Lockfile, MissReason, ToolKind,
};
pub use config::{
    unknown_inputs, ActionConfig, Validate, ValidationResult, DEFAULT_BOT_LOGIN, KNOWN_INPUTS,
};
pub use context::{CachePaths, CiContext};
pub use format::{format_duration, ResultFormatter};
pub use github::{GhCli, IssueComment, RepoApi, WorkflowJob, WorkflowRun};
pub use identity::{BuildIdentity, BuildIdentityResolver};
pub use outputs::{error_annotation, ActionOutputs};
pub use pipeline::{FinalState, PipelineOutcome, Stage, TestOrchestrator};
pub use poll::NetworkPoller;
pub use process::{CommandSpec, DetachedProcess, Execution, ProcessRunner, SystemProcessRunner};
pub use report::{PublishOutcome, ReportPublisher, ReportSettings};
pub use results::{RunOutcome, RunResult, TestResults};
pub use runner::{
    select_runner, CliPrefixRunner, CustomCommandRunner, ModuleRunner, RunOptions,
    TestRunRequest, TestRunner,
};
pub use tokenize::{split_list, tokenize};
pub use workdir::WorkingDirGuard;
