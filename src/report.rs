//! Pull request report comment.
//!
//! One comment per pull request carries the latest results. Reruns update
//! that comment instead of adding new ones.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::format::{format_duration, ResultFormatter};
use crate::github::{IssueComment, RepoApi};
use crate::results::{RunOutcome, TestResults};

/// First line of every report comment this crate writes.
pub const REPORT_MARKER: &str = "<!-- cypress-ci-report -->";

/// Heading used by earlier report comments, still recognised for updates.
pub const LEGACY_REPORT_MARKER: &str = "## Cypress Results";

/// Markers identifying a report comment.
pub const REPORT_MARKERS: [&str; 2] = [REPORT_MARKER, LEGACY_REPORT_MARKER];

/// What [`ReportPublisher::publish`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Reporting is disabled or there is nothing to report on.
    Skipped { reason: String },
    /// A new comment was created.
    Created { comment_id: u64 },
    /// The existing comment was updated.
    Updated { comment_id: u64 },
}

/// Settings for the publisher.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    /// `comment-on-pull-request` input.
    pub enabled: bool,
    /// `owner/repo`.
    pub repository: Option<String>,
    /// Pull request number, when the run belongs to one.
    pub pull_request: Option<u64>,
    /// Login of the account that owns report comments.
    pub bot_login: String,
}

/// Posts or updates the results comment on a pull request.
pub struct ReportPublisher {
    settings: ReportSettings,
    api: Option<Arc<dyn RepoApi>>,
    formatter: ResultFormatter,
}

impl ReportPublisher {
    /// Creates a publisher. `api` is `None` when no credential is available.
    pub fn new(settings: ReportSettings, api: Option<Arc<dyn RepoApi>>) -> Self {
        Self {
            settings,
            api,
            formatter: ResultFormatter::new(),
        }
    }

    /// Publishes `outcome`.
    ///
    /// Fails when reporting is enabled without a credential; otherwise
    /// skips silently whenever there is no pull request or no structured
    /// results.
    pub async fn publish(&self, outcome: &RunOutcome) -> Result<PublishOutcome> {
        if !self.settings.enabled {
            return Ok(skipped("comment-on-pull-request is disabled"));
        }

        let Some(api) = &self.api else {
            return Err(Error::Config(
                "comment-on-pull-request requires github-token".to_string(),
            ));
        };

        let (Some(repository), Some(pull_request)) =
            (self.settings.repository.as_deref(), self.settings.pull_request)
        else {
            tracing::info!("not a pull request run, skipping report comment");
            return Ok(skipped("no pull request context"));
        };

        let Some(results) = outcome.results() else {
            tracing::info!("no structured results (custom command or command-prefix mode), skipping report comment");
            return Ok(skipped("no structured results"));
        };

        let body = self.render_body(results);
        let comments = api.list_comments(repository, pull_request).await?;

        match find_report_comment(&comments, &self.settings.bot_login) {
            Some(existing) => {
                let updated = api.update_comment(repository, existing.id, &body).await?;
                tracing::info!(pull_request, comment_id = updated.id, "updated report comment");
                Ok(PublishOutcome::Updated {
                    comment_id: updated.id,
                })
            }
            None => {
                let created = api.create_comment(repository, pull_request, &body).await?;
                tracing::info!(pull_request, comment_id = created.id, "created report comment");
                Ok(PublishOutcome::Created {
                    comment_id: created.id,
                })
            }
        }
    }

    /// Renders the comment body.
    pub fn render_body(&self, results: &TestResults) -> String {
        let mut body = String::new();

        body.push_str(REPORT_MARKER);
        body.push('\n');
        body.push_str(LEGACY_REPORT_MARKER);
        body.push_str("\n\n");

        if results.total_failed == 0 {
            body.push_str(&format!("✔ All {} tests passed\n\n", results.total_tests));
        } else {
            body.push_str(&format!(
                "✖ {} of {} tests failed\n\n",
                results.total_failed, results.total_tests
            ));
        }

        body.push_str("```text\n");
        body.push_str(&self.formatter.format(results));
        body.push_str("\n```\n\n");

        body.push_str(&format!(
            "**Duration:** {}\n",
            format_duration(results.total_duration)
        ));
        if let Some(url) = &results.run_url {
            body.push_str(&format!("**Recorded run:** {}\n", url));
        }
        if let Some(version) = &results.cypress_version {
            body.push_str(&format!("**Cypress:** {}\n", version));
        }

        body
    }
}

fn skipped(reason: &str) -> PublishOutcome {
    PublishOutcome::Skipped {
        reason: reason.to_string(),
    }
}

/// Finds the report comment owned by `bot_login`.
pub fn find_report_comment<'a>(
    comments: &'a [IssueComment],
    bot_login: &str,
) -> Option<&'a IssueComment> {
    comments.iter().find(|comment| {
        let by_bot = comment
            .user
            .as_ref()
            .is_some_and(|user| user.login == bot_login);
        by_bot
            && REPORT_MARKERS
                .iter()
                .any(|marker| comment.body.starts_with(marker))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{CommentUser, WorkflowJob, WorkflowRun};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory pull request comment thread.
    #[derive(Default)]
    struct FakeComments {
        comments: Mutex<Vec<IssueComment>>,
        next_id: Mutex<u64>,
    }

    impl FakeComments {
        fn with(comments: Vec<IssueComment>) -> Self {
            let next = comments.iter().map(|c| c.id).max().unwrap_or(0);
            Self {
                comments: Mutex::new(comments),
                next_id: Mutex::new(next),
            }
        }

        fn snapshot(&self) -> Vec<IssueComment> {
            self.comments.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RepoApi for FakeComments {
        async fn workflow_run(&self, _: &str, _: u64) -> Result<WorkflowRun> {
            unreachable!()
        }

        async fn workflow_jobs(&self, _: &str, _: u64) -> Result<Vec<WorkflowJob>> {
            unreachable!()
        }

        async fn list_comments(&self, _: &str, _: u64) -> Result<Vec<IssueComment>> {
            Ok(self.snapshot())
        }

        async fn create_comment(&self, _: &str, _: u64, body: &str) -> Result<IssueComment> {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            let comment = IssueComment {
                id: *next,
                body: body.to_string(),
                user: Some(CommentUser {
                    login: "github-actions[bot]".to_string(),
                }),
            };
            self.comments.lock().unwrap().push(comment.clone());
            Ok(comment)
        }

        async fn update_comment(&self, _: &str, id: u64, body: &str) -> Result<IssueComment> {
            let mut comments = self.comments.lock().unwrap();
            let comment = comments
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| Error::GitHub("not found".to_string()))?;
            comment.body = body.to_string();
            Ok(comment.clone())
        }
    }

    fn settings() -> ReportSettings {
        ReportSettings {
            enabled: true,
            repository: Some("octo/app".to_string()),
            pull_request: Some(7),
            bot_login: "github-actions[bot]".to_string(),
        }
    }

    fn structured(failed: u64) -> RunOutcome {
        RunOutcome::Structured(TestResults {
            total_tests: 5,
            total_passed: 5 - failed,
            total_failed: failed,
            total_duration: 12_345,
            ..Default::default()
        })
    }

    fn comment(id: u64, login: &str, body: &str) -> IssueComment {
        IssueComment {
            id,
            body: body.to_string(),
            user: Some(CommentUser {
                login: login.to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn publishing_twice_keeps_one_comment() {
        let api = Arc::new(FakeComments::default());
        let publisher = ReportPublisher::new(settings(), Some(api.clone()));

        let first = publisher.publish(&structured(0)).await.unwrap();
        let second = publisher.publish(&structured(1)).await.unwrap();

        assert!(matches!(first, PublishOutcome::Created { comment_id } if comment_id == 1));
        assert_eq!(second, PublishOutcome::Updated { comment_id: 1 });

        let comments = api.snapshot();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].body.contains("1 of 5 tests failed"));
    }

    #[tokio::test]
    async fn updates_legacy_marker_comment() {
        let api = Arc::new(FakeComments::with(vec![
            comment(10, "someone", "## Cypress Results\nby a human"),
            comment(11, "github-actions[bot]", "## Cypress Results\nold"),
        ]));
        let publisher = ReportPublisher::new(settings(), Some(api.clone()));

        let outcome = publisher.publish(&structured(0)).await.unwrap();

        assert_eq!(outcome, PublishOutcome::Updated { comment_id: 11 });
        let comments = api.snapshot();
        assert!(comments[0].body.contains("by a human"));
        assert!(comments[1].body.starts_with(REPORT_MARKER));
    }

    #[tokio::test]
    async fn ignores_bot_comments_without_marker() {
        let api = Arc::new(FakeComments::with(vec![comment(
            3,
            "github-actions[bot]",
            "Deploy preview ready",
        )]));
        let publisher = ReportPublisher::new(settings(), Some(api.clone()));

        let outcome = publisher.publish(&structured(0)).await.unwrap();

        assert_eq!(outcome, PublishOutcome::Created { comment_id: 4 });
        assert_eq!(api.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn disabled_reporting_is_a_no_op() {
        let publisher = ReportPublisher::new(
            ReportSettings {
                enabled: false,
                ..settings()
            },
            None,
        );
        let outcome = publisher.publish(&structured(0)).await.unwrap();
        assert!(matches!(outcome, PublishOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn enabled_without_credential_fails() {
        let publisher = ReportPublisher::new(settings(), None);
        let err = publisher.publish(&structured(0)).await.unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("github-token")));
    }

    #[tokio::test]
    async fn unstructured_outcome_is_skipped() {
        let api = Arc::new(FakeComments::default());
        let publisher = ReportPublisher::new(settings(), Some(api.clone()));

        let outcome = publisher.publish(&RunOutcome::Unstructured).await.unwrap();

        assert!(matches!(outcome, PublishOutcome::Skipped { ref reason } if reason.contains("structured")));
        assert!(api.snapshot().is_empty());
    }

    #[tokio::test]
    async fn missing_pull_request_is_skipped() {
        let api = Arc::new(FakeComments::default());
        let publisher = ReportPublisher::new(
            ReportSettings {
                pull_request: None,
                ..settings()
            },
            Some(api.clone()),
        );

        let outcome = publisher.publish(&structured(0)).await.unwrap();
        assert!(matches!(outcome, PublishOutcome::Skipped { .. }));
        assert!(api.snapshot().is_empty());
    }

    #[test]
    fn body_contains_table_and_links() {
        let publisher = ReportPublisher::new(settings(), None);
        let body = publisher.render_body(&TestResults {
            total_tests: 2,
            total_passed: 2,
            total_duration: 65_499,
            run_url: Some("https://cloud.cypress.io/runs/1".to_string()),
            cypress_version: Some("13.6.0".to_string()),
            ..Default::default()
        });

        assert!(body.starts_with(REPORT_MARKER));
        assert!(body.contains("✔ All 2 tests passed"));
        assert!(body.contains("```text\n┌"));
        assert!(body.contains("**Duration:** 01:05.499"));
        assert!(body.contains("https://cloud.cypress.io/runs/1"));
        assert!(body.contains("**Cypress:** 13.6.0"));
    }
}
