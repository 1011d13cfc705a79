//! GitHub API access.
//!
//! The pipeline needs workflow run metadata, the run's job list, and pull
//! request comments. [`GhCli`] serves them through `gh api`, which owns
//! authentication and transport.

use std::process::Stdio;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{Error, Result};

/// Workflow run metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Run id.
    pub id: u64,
    /// Branch the run was triggered for.
    #[serde(default)]
    pub head_branch: Option<String>,
}

/// A job in a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowJob {
    /// Job id. Changes on every rerun.
    pub id: u64,
    /// Job name.
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct JobList {
    #[serde(default)]
    jobs: Vec<WorkflowJob>,
}

/// Comment author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentUser {
    pub login: String,
}

/// An issue or pull request comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueComment {
    /// Comment id.
    pub id: u64,
    /// Markdown body.
    #[serde(default)]
    pub body: String,
    /// Author, absent for deleted users.
    #[serde(default)]
    pub user: Option<CommentUser>,
}

/// Remote repository operations used by the pipeline.
#[async_trait]
pub trait RepoApi: Send + Sync {
    /// Fetches a workflow run.
    async fn workflow_run(&self, repository: &str, run_id: u64) -> Result<WorkflowRun>;

    /// Lists the jobs of a workflow run, in API order.
    async fn workflow_jobs(&self, repository: &str, run_id: u64) -> Result<Vec<WorkflowJob>>;

    /// Lists comments on a pull request.
    async fn list_comments(&self, repository: &str, pull_request: u64) -> Result<Vec<IssueComment>>;

    /// Creates a comment on a pull request.
    async fn create_comment(
        &self,
        repository: &str,
        pull_request: u64,
        body: &str,
    ) -> Result<IssueComment>;

    /// Replaces the body of an existing comment.
    async fn update_comment(
        &self,
        repository: &str,
        comment_id: u64,
        body: &str,
    ) -> Result<IssueComment>;
}

/// [`RepoApi`] backed by the `gh` CLI.
pub struct GhCli {
    /// Path to the gh binary.
    cli_path: String,
    /// Token passed as `GH_TOKEN`.
    token: String,
}

impl GhCli {
    /// Creates a client authenticating with `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            cli_path: "gh".to_string(),
            token: token.into(),
        }
    }

    /// Uses a custom gh binary.
    pub fn with_cli_path(mut self, cli_path: impl Into<String>) -> Self {
        self.cli_path = cli_path.into();
        self
    }

    async fn api<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        tracing::debug!(args = ?args, "calling gh api");

        let output = Command::new(&self.cli_path)
            .arg("api")
            .args(["-H", "Accept: application/vnd.github+json"])
            .args(args)
            .env("GH_TOKEN", &self.token)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::GitHub(format!("failed to run gh: {}", e)))?;

        if !output.status.success() {
            return Err(Error::GitHub(format!(
                "gh api {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::GitHub(format!("unexpected gh api response: {}", e)))
    }
}

#[async_trait]
impl RepoApi for GhCli {
    async fn workflow_run(&self, repository: &str, run_id: u64) -> Result<WorkflowRun> {
        let path = format!("repos/{}/actions/runs/{}", repository, run_id);
        self.api(&[&path]).await
    }

    async fn workflow_jobs(&self, repository: &str, run_id: u64) -> Result<Vec<WorkflowJob>> {
        let path = format!("repos/{}/actions/runs/{}/jobs", repository, run_id);
        let list: JobList = self.api(&[&path]).await?;
        Ok(list.jobs)
    }

    async fn list_comments(&self, repository: &str, pull_request: u64) -> Result<Vec<IssueComment>> {
        let path = format!(
            "repos/{}/issues/{}/comments?per_page=100",
            repository, pull_request
        );
        // TODO: follow Link headers once a report needs to be found past the
        // first 100 comments.
        self.api(&[&path]).await
    }

    async fn create_comment(
        &self,
        repository: &str,
        pull_request: u64,
        body: &str,
    ) -> Result<IssueComment> {
        let path = format!("repos/{}/issues/{}/comments", repository, pull_request);
        let field = format!("body={}", body);
        self.api(&[&path, "-X", "POST", "-f", &field]).await
    }

    async fn update_comment(
        &self,
        repository: &str,
        comment_id: u64,
        body: &str,
    ) -> Result<IssueComment> {
        let path = format!("repos/{}/issues/comments/{}", repository, comment_id);
        let field = format!("body={}", body);
        self.api(&[&path, "-X", "PATCH", "-f", &field]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_run_parses_api_payload() {
        let payload = r#"{"id": 123, "name": "CI", "head_branch": "feature/x", "head_sha": "abc"}"#;
        let run: WorkflowRun = serde_json::from_str(payload).unwrap();
        assert_eq!(run.id, 123);
        assert_eq!(run.head_branch.as_deref(), Some("feature/x"));
    }

    #[test]
    fn job_list_parses_api_payload() {
        let payload = r#"{"total_count": 2, "jobs": [
            {"id": 9001, "run_id": 123, "name": "cypress (1)", "status": "in_progress"},
            {"id": 9002, "run_id": 123, "name": "cypress (2)", "status": "queued"}
        ]}"#;
        let list: JobList = serde_json::from_str(payload).unwrap();
        assert_eq!(list.jobs.len(), 2);
        assert_eq!(list.jobs[0].id, 9001);
        assert_eq!(list.jobs[1].name, "cypress (2)");
    }

    #[test]
    fn comment_parses_with_and_without_user() {
        let payload = r#"[
            {"id": 1, "body": "hello", "user": {"login": "github-actions[bot]", "id": 41898282}},
            {"id": 2, "body": "ghost", "user": null}
        ]"#;
        let comments: Vec<IssueComment> = serde_json::from_str(payload).unwrap();
        assert_eq!(
            comments[0].user.as_ref().map(|u| u.login.as_str()),
            Some("github-actions[bot]")
        );
        assert!(comments[1].user.is_none());
    }

    #[tokio::test]
    async fn missing_gh_binary_is_a_github_error() {
        let client = GhCli::new("token").with_cli_path("/definitely/not/gh");
        let err = client.workflow_run("o/r", 1).await.unwrap_err();
        assert!(matches!(err, Error::GitHub(_)));
    }
}
