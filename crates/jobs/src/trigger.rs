use futures_util::future::join_all;
use turnip_core::models::Command;
use turnip_github::events::Repository;
use turnip_yaml::Project;

use crate::{
    JobContext,
    check_run::{CheckRun, create_check_run, fail_check_run},
    dispatch::{JobDispatch, JobRequest},
};

/// Description posted on a check run whose job could not be dispatched.
pub const DISPATCH_FAILED: &str = "Failed to dispatch job";

/// The commit a batch of projects runs against.
#[derive(Debug, Clone)]
pub struct TriggerTarget<'a> {
    /// Repository receiving statuses and comments.
    pub repo: &'a Repository,
    /// Repository the job clones, which differs from `repo` for forks.
    pub source: &'a Repository,
    pub head_ref: &'a str,
    pub sha: &'a str,
    pub comments_url: &'a str,
    pub extra_args: Option<&'a str>,
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Dispatched { check: CheckRun, job: String },
    /// The check run could not be created; nothing was dispatched.
    CheckFailed { context: String, error: anyhow::Error },
    /// The job could not be dispatched; the check run was failed.
    DispatchFailed { check: CheckRun, error: anyhow::Error },
}

impl TriggerOutcome {
    pub fn context(&self) -> &str {
        match self {
            Self::Dispatched { check, .. } | Self::DispatchFailed { check, .. } => &check.context,
            Self::CheckFailed { context, .. } => context,
        }
    }

    pub fn is_dispatched(&self) -> bool { matches!(self, Self::Dispatched { .. }) }
}

/// Create the check run for one project and dispatch its job.
pub async fn trigger_project(
    ctx: &JobContext,
    target: &TriggerTarget<'_>,
    project: &Project,
    command: Command,
) -> TriggerOutcome {
    let source_control = ctx.source_control.as_ref();
    let context = project.check_context(command);
    let mut check = match create_check_run(source_control, target.repo, target.sha, context).await {
        Ok(check) => check,
        Err(error) => {
            tracing::error!("{error:?}");
            return TriggerOutcome::CheckFailed { context: project.check_context(command), error };
        }
    };

    let request = JobRequest {
        command,
        repo_full_name: &target.repo.full_name,
        clone_url: &target.source.clone_url,
        head_ref: target.head_ref,
        check_url: &check.url,
        check_name: &check.context,
        comments_url: target.comments_url,
        project,
        extra_args: target.extra_args,
    };
    let result = match JobDispatch::new(&request, &ctx.config.scheduler, &ctx.config.server.name) {
        Ok(job) => ctx.scheduler.dispatch(&job).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(job) => {
            tracing::info!("Dispatched job {job} for {}", check.context);
            TriggerOutcome::Dispatched { check, job }
        }
        Err(error) => {
            tracing::error!("Failed to dispatch job for {}: {error:?}", check.context);
            if let Err(e) = fail_check_run(source_control, &mut check, DISPATCH_FAILED).await {
                tracing::error!("Failed to mark {} as failed: {e:?}", check.context);
            }
            TriggerOutcome::DispatchFailed { check, error }
        }
    }
}

/// Trigger every project concurrently. Outcomes are returned in the order
/// of `projects`.
pub async fn trigger_projects(
    ctx: &JobContext,
    target: &TriggerTarget<'_>,
    projects: &[&Project],
    command: Command,
) -> Vec<TriggerOutcome> {
    join_all(projects.iter().map(|project| trigger_project(ctx, target, project, command))).await
}

/// Plain-text summary of a trigger run, empty when everything was dispatched.
pub fn failure_summary(outcomes: &[TriggerOutcome]) -> String {
    outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            TriggerOutcome::Dispatched { .. } => None,
            TriggerOutcome::CheckFailed { context, error } => {
                Some(format!("Failed to create check run {context}: {error:#}"))
            }
            TriggerOutcome::DispatchFailed { check, error } => {
                Some(format!("{DISPATCH_FAILED} for {}: {error:#}", check.context))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
