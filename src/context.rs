//! CI environment captured once at start-up.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Cache folders on the runner, derived from the home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    /// npm download cache (`~/.npm`).
    pub npm: PathBuf,
    /// Yarn v1 cache (`~/.cache/yarn`).
    pub yarn: PathBuf,
    /// Cypress binary cache (`~/.cache/Cypress`).
    pub cypress: PathBuf,
}

impl CachePaths {
    /// Derives cache folders from a home directory.
    pub fn from_home(home: &Path) -> Self {
        Self {
            npm: home.join(".npm"),
            yarn: home.join(".cache").join("yarn"),
            cypress: home.join(".cache").join("Cypress"),
        }
    }
}

/// Facts about the CI run, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiContext {
    /// Workflow name (`GITHUB_WORKFLOW`).
    pub workflow: String,
    /// Commit sha (`GITHUB_SHA`).
    pub sha: String,
    /// API token from the environment (`GITHUB_TOKEN`).
    pub token: Option<String>,
    /// Workflow run id (`GITHUB_RUN_ID`).
    pub run_id: Option<u64>,
    /// `owner/repo` slug (`GITHUB_REPOSITORY`).
    pub repository: Option<String>,
    /// Pull request number from the event payload.
    pub pull_request: Option<u64>,
    /// Checkout root (`GITHUB_WORKSPACE`, else the current directory).
    pub workspace: PathBuf,
    /// Node-style `<platform>-<arch>`, e.g. `linux-x64`.
    pub platform_arch: String,
    /// Whether the runner is Windows.
    pub is_windows: bool,
    /// Runner cache folders.
    pub cache_paths: CachePaths,
    /// Step output file (`GITHUB_OUTPUT`).
    pub output_file: Option<PathBuf>,
    /// Exported environment file (`GITHUB_ENV`).
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(default)]
    pull_request: Option<PullRequestRef>,
    #[serde(default)]
    number: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PullRequestRef {
    number: u64,
}

impl CiContext {
    /// Reads the context from the process environment.
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".to_string()))?;
        let workspace = match var("GITHUB_WORKSPACE") {
            Some(path) => PathBuf::from(path),
            None => std::env::current_dir()?,
        };

        let pull_request = match var("GITHUB_EVENT_PATH") {
            Some(path) => read_pull_request_number(Path::new(&path)),
            None => None,
        };

        let run_id = var("GITHUB_RUN_ID").and_then(|id| match id.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(run_id = %id, "ignoring non-numeric GITHUB_RUN_ID");
                None
            }
        });

        Ok(Self {
            workflow: var("GITHUB_WORKFLOW").unwrap_or_default(),
            sha: var("GITHUB_SHA").unwrap_or_default(),
            token: var("GITHUB_TOKEN"),
            run_id,
            repository: var("GITHUB_REPOSITORY"),
            pull_request,
            workspace,
            platform_arch: platform_arch(std::env::consts::OS, std::env::consts::ARCH),
            is_windows: cfg!(windows),
            cache_paths: CachePaths::from_home(&home),
            output_file: var("GITHUB_OUTPUT").map(PathBuf::from),
            env_file: var("GITHUB_ENV").map(PathBuf::from),
        })
    }

    /// A context rooted at `workspace` with no CI metadata. Used for local runs
    /// and tests.
    pub fn local(workspace: impl Into<PathBuf>, home: &Path) -> Self {
        Self {
            workflow: String::new(),
            sha: String::new(),
            token: None,
            run_id: None,
            repository: None,
            pull_request: None,
            workspace: workspace.into(),
            platform_arch: platform_arch(std::env::consts::OS, std::env::consts::ARCH),
            is_windows: cfg!(windows),
            cache_paths: CachePaths::from_home(home),
            output_file: None,
            env_file: None,
        }
    }

    /// Resolves the configured working directory against the workspace.
    pub fn working_dir(&self, configured: Option<&Path>) -> PathBuf {
        match configured {
            Some(dir) if dir.is_absolute() => dir.to_path_buf(),
            Some(dir) => self.workspace.join(dir),
            None => self.workspace.clone(),
        }
    }
}

/// Maps Rust's OS/arch names to the names Node reports.
pub fn platform_arch(os: &str, arch: &str) -> String {
    let platform = match os {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    };
    let arch = match arch {
        "x86_64" => "x64",
        "x86" => "ia32",
        "aarch64" => "arm64",
        "arm" => "arm",
        other => other,
    };
    format!("{}-{}", platform, arch)
}

fn read_pull_request_number(path: &Path) -> Option<u64> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read event payload");
            return None;
        }
    };
    pull_request_number(&content)
}

/// Extracts the pull request number from a webhook event payload.
pub fn pull_request_number(payload: &str) -> Option<u64> {
    let event: EventPayload = serde_json::from_str(payload).ok()?;
    let pr = event.pull_request?;
    Some(event.number.unwrap_or(pr.number))
}
