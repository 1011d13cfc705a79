//! Build identity for parallel and grouped runs.
//!
//! Every shard of a run must report the same build id to the recording
//! service. Without API access the id is synthesized from the workflow name
//! and commit. With API access it is `<run id>-<first job id>`, which stays
//! the same across shards of one attempt and changes when the run is
//! re-attempted (job ids are reissued while the job count stays the same).

use std::sync::Arc;

use crate::context::CiContext;
use crate::github::RepoApi;

/// Identifier shared by all shards of a CI run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildIdentity {
    /// Branch name, when the run metadata could be fetched.
    pub branch: Option<String>,
    /// Build id passed to the test runner.
    pub parallel_id: String,
}

/// Resolves the [`BuildIdentity`] of the current run.
pub struct BuildIdentityResolver {
    api: Option<Arc<dyn RepoApi>>,
    workflow: String,
    sha: String,
    repository: Option<String>,
    run_id: Option<u64>,
}

impl BuildIdentityResolver {
    /// Creates a resolver. `api` is `None` when no credential is available.
    pub fn new(context: &CiContext, api: Option<Arc<dyn RepoApi>>) -> Self {
        Self {
            api,
            workflow: context.workflow.clone(),
            sha: context.sha.clone(),
            repository: context.repository.clone(),
            run_id: context.run_id,
        }
    }

    /// Id used when the API cannot provide one.
    pub fn synthetic_id(&self) -> String {
        format!("{} - {}", self.workflow, self.sha)
    }

    /// Resolves the identity. Never fails: API problems fall back to the
    /// synthetic id.
    pub async fn resolve(&self) -> BuildIdentity {
        let synthetic = BuildIdentity {
            branch: None,
            parallel_id: self.synthetic_id(),
        };

        let Some(api) = &self.api else {
            tracing::info!(parallel_id = %synthetic.parallel_id, "no GitHub token, using synthetic build id");
            return synthetic;
        };
        let (Some(repository), Some(run_id)) = (self.repository.as_deref(), self.run_id) else {
            tracing::warn!("GitHub token present but repository or run id unknown, using synthetic build id");
            return synthetic;
        };

        let branch = match api.workflow_run(repository, run_id).await {
            Ok(run) => run.head_branch,
            Err(e) => {
                tracing::warn!(run_id, error = %e, "failed to fetch workflow run");
                None
            }
        };

        let first_job = match api.workflow_jobs(repository, run_id).await {
            Ok(jobs) => jobs.into_iter().next(),
            Err(e) => {
                tracing::warn!(run_id, error = %e, "failed to list workflow jobs");
                None
            }
        };

        let parallel_id = match first_job {
            Some(job) => format!("{}-{}", run_id, job.id),
            None => self.synthetic_id(),
        };

        tracing::info!(parallel_id = %parallel_id, branch = ?branch, "resolved build identity");
        BuildIdentity {
            branch,
            parallel_id,
        }
    }
}
