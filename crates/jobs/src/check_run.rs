//! Commit-status backed check runs: `Queued → Running → Succeeded | Failed`.

use anyhow::{Context, Result};
use turnip_core::models::{CheckState, Conclusion};
use turnip_github::{CommitStatus, SourceControl, events::Repository};

/// A check run as tracked for one triggered project and command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRun {
    /// Status URL the job reports against.
    pub url: String,
    /// Context name, `turnip/{adapter}/{command}/{dir}/{workspace}`.
    pub context: String,
    pub sha: String,
    pub state: CheckState,
}

async fn post_state(
    source_control: &dyn SourceControl,
    url: &str,
    context: &str,
    state: CheckState,
    description: Option<&str>,
) -> Result<()> {
    let status = CommitStatus {
        state: state.status_state().to_string(),
        description: description.unwrap_or(state.description()).to_string(),
        context: context.to_string(),
    };
    source_control.create_status(url, &status).await
}

/// Post a Queued status for `context` on `sha`.
pub async fn create_check_run(
    source_control: &dyn SourceControl,
    repo: &Repository,
    sha: &str,
    context: String,
) -> Result<CheckRun> {
    let url = repo.status_url(sha);
    post_state(source_control, &url, &context, CheckState::Queued, None)
        .await
        .with_context(|| format!("Failed to create check run {context}"))?;
    tracing::debug!("Created check run {context} at {url}");
    Ok(CheckRun { url, context, sha: sha.to_string(), state: CheckState::Queued })
}

/// Mark the check run as running. Failures are logged and swallowed so a
/// status update never holds up the job.
pub async fn start_check_run(source_control: &dyn SourceControl, url: &str, context: &str) {
    if let Err(e) = post_state(source_control, url, context, CheckState::Running, None).await {
        tracing::error!("Failed to start check run {context}: {e:?}");
    }
}

pub async fn finish_check_run(
    source_control: &dyn SourceControl,
    url: &str,
    context: &str,
    conclusion: Conclusion,
) -> Result<()> {
    post_state(source_control, url, context, conclusion.into(), None)
        .await
        .with_context(|| format!("Failed to finish check run {context}"))
}

/// Fail a check run with a custom description, for jobs that never started.
pub async fn fail_check_run(
    source_control: &dyn SourceControl,
    check: &mut CheckRun,
    description: &str,
) -> Result<()> {
    if !check.state.can_transition_to(CheckState::Failed) {
        return Ok(());
    }
    post_state(source_control, &check.url, &check.context, CheckState::Failed, Some(description))
        .await?;
    check.state = CheckState::Failed;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSourceControl;

    #[tokio::test]
    async fn test_lifecycle_statuses() {
        let github = FakeSourceControl::default();
        let repo = Repository::from_full_name("acme/infra");
        let context = "turnip/terraform/plan/infra/staging";
        let check = create_check_run(&github, &repo, "abc", context.to_string()).await.unwrap();
        assert_eq!(check.url, "/repos/acme/infra/statuses/abc");
        assert_eq!(check.state, CheckState::Queued);

        start_check_run(&github, &check.url, context).await;
        finish_check_run(&github, &check.url, context, Conclusion::Success).await.unwrap();

        let statuses = github.statuses();
        let states =
            statuses.iter().map(|(_, s)| (s.state.as_str(), s.description.as_str())).collect::<Vec<_>>();
        assert_eq!(states, vec![
            ("pending", "Queued"),
            ("pending", "Turnip is running"),
            ("success", "Turnip succeeded"),
        ]);
        assert!(statuses.iter().all(|(url, s)| url == &check.url && s.context == context));
    }

    #[tokio::test]
    async fn test_start_failure_is_swallowed() {
        let github = FakeSourceControl { fail_statuses: true, ..Default::default() };
        start_check_run(&github, "/repos/acme/infra/statuses/abc", "ctx").await;
        let repo = Repository::from_full_name("acme/infra");
        assert!(create_check_run(&github, &repo, "abc", "ctx".into()).await.is_err());
    }

    #[tokio::test]
    async fn test_fail_check_run() {
        let github = FakeSourceControl::default();
        let repo = Repository::from_full_name("acme/infra");
        let mut check = create_check_run(&github, &repo, "abc", "ctx".into()).await.unwrap();
        fail_check_run(&github, &mut check, "Failed to dispatch job").await.unwrap();
        assert_eq!(check.state, CheckState::Failed);
        let (_, last) = github.statuses().pop().unwrap();
        assert_eq!(last.state, "failure");
        assert_eq!(last.description, "Failed to dispatch job");

        fail_check_run(&github, &mut check, "again").await.unwrap();
        assert_eq!(github.statuses().len(), 2);
    }
}
