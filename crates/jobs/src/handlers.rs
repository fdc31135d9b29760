use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use turnip_core::models::Command;
use turnip_github::{
    Reaction,
    events::{IssueCommentEvent, IssuePullRequest, PullRequestEvent, Repository},
    parse_repository,
};
use turnip_trigger::{ChatCommand, ChatRequest, TriggerMode, USAGE, projects_to_trigger};
use turnip_yaml::{CONFIG_FILE, Config};

use crate::{
    JobContext,
    trigger::{
        DISPATCH_FAILED, TriggerOutcome, TriggerTarget, failure_summary, trigger_project,
        trigger_projects,
    },
};

/// Pull request actions that trigger automatic plots.
pub const PULL_REQUEST_ACTIONS: &[&str] = &["opened", "synchronize", "reopened"];

/// Fetch and load `turnip.yaml` at `git_ref`.
pub async fn load_config(ctx: &JobContext, repo: &Repository, git_ref: &str) -> Result<Config> {
    let data = ctx
        .source_control
        .fetch_file(repo, CONFIG_FILE, git_ref)
        .await
        .with_context(|| format!("Failed to fetch {CONFIG_FILE}"))?;
    Config::load(&data).with_context(|| format!("Failed to load {CONFIG_FILE}"))
}

/// Plot every auto-enabled project a pull request touches.
pub async fn process_pull_request(
    ctx: &JobContext,
    event: &PullRequestEvent,
) -> Result<Vec<TriggerOutcome>> {
    if !PULL_REQUEST_ACTIONS.contains(&event.action.as_str()) {
        tracing::debug!("Ignoring pull request action {}", event.action);
        return Ok(vec![]);
    }
    let pr = &event.pull_request;
    tracing::info!(
        "Processing pull request {}#{} ({}) at {}",
        event.repository.full_name,
        pr.number,
        event.action,
        pr.head.sha
    );
    let source = pr.head_repository().unwrap_or(&event.repository);
    let config = load_config(ctx, source, &pr.head.sha).await?;
    let changes = ctx
        .source_control
        .list_pull_request_files(&event.repository, pr.number)
        .await
        .context("Failed to list changed files")?;

    let projects = projects_to_trigger(&changes, &config.projects, TriggerMode::Auto);
    if projects.is_empty() {
        tracing::info!("No projects to plot for {}#{}", event.repository.full_name, pr.number);
        return Ok(vec![]);
    }
    let target = TriggerTarget {
        repo: &event.repository,
        source,
        head_ref: &pr.head.git_ref,
        sha: &pr.head.sha,
        comments_url: &pr.comments_url,
        extra_args: None,
    };
    let outcomes = trigger_projects(ctx, &target, &projects, Command::Plot).await;
    let summary = failure_summary(&outcomes);
    if !summary.is_empty() {
        tracing::warn!("{summary}");
    }
    Ok(outcomes)
}

async fn run_chat_command(
    ctx: &JobContext,
    event: &IssueCommentEvent,
    link: &IssuePullRequest,
    command: &ChatCommand,
) -> Result<String> {
    let pr = ctx
        .source_control
        .get_pull_request(&link.url)
        .await
        .context("Failed to fetch pull request")?;
    let source = pr.head_repository().unwrap_or(&event.repository);
    let config = load_config(ctx, source, &pr.head.sha).await?;
    let changes = ctx
        .source_control
        .list_pull_request_files(&event.repository, pr.number)
        .await
        .context("Failed to list changed files")?;

    let projects = projects_to_trigger(&changes, &config.projects, TriggerMode::Explicit)
        .into_iter()
        .filter(|project| command.selects(project))
        .collect::<Vec<_>>();
    if projects.is_empty() {
        return Ok(format!("No projects to {}", command.command));
    }
    let target = TriggerTarget {
        repo: &event.repository,
        source,
        head_ref: &pr.head.git_ref,
        sha: &pr.head.sha,
        comments_url: &event.issue.comments_url,
        extra_args: None,
    };
    let outcomes = trigger_projects(ctx, &target, &projects, command.command).await;
    let summary = failure_summary(&outcomes);
    if outcomes.iter().any(TriggerOutcome::is_dispatched) { Ok(summary) } else { Err(anyhow!(summary)) }
}

/// Handle a `/turnip` chat command posted on a pull request. The comment
/// gets a +1 reaction on success and a confused reaction plus an error
/// comment on failure.
pub async fn process_issue_comment(ctx: &JobContext, event: &IssueCommentEvent) -> Result<()> {
    if event.action != "created" {
        return Ok(());
    }
    let Some(link) = &event.issue.pull_request else {
        return Ok(());
    };
    let request = match ChatRequest::parse(&event.comment.body) {
        Ok(None) => return Ok(()),
        Ok(Some(request)) => Ok(request),
        Err(e) => Err(format!("{e}\n\n```\n{USAGE}```")),
    };
    tracing::info!(
        "Processing command on {}#{}: {}",
        event.repository.full_name,
        event.issue.number,
        event.comment.body.lines().next().unwrap_or_default()
    );

    let result = match request {
        Ok(ChatRequest::Help) => Ok(USAGE.to_string()),
        Ok(ChatRequest::Run(command)) => {
            run_chat_command(ctx, event, link, &command).await.map_err(|e| format!("{e:#}"))
        }
        Err(message) => Err(message),
    };

    let source_control = ctx.source_control.as_ref();
    let comments_url = &event.issue.comments_url;
    let reactions_url = &event.comment.reactions_url;
    match result {
        Ok(output) => {
            if let Err(e) = source_control.react(reactions_url, Reaction::ThumbsUp).await {
                tracing::error!("Failed to react to comment: {e:?}");
            }
            if !output.is_empty()
                && let Err(e) =
                    source_control.create_comment(comments_url, &format!("```\n{output}\n```")).await
            {
                tracing::error!("Failed to post command output: {e:?}");
            }
            Ok(())
        }
        Err(message) => {
            if let Err(e) = source_control.react(reactions_url, Reaction::Confused).await {
                tracing::error!("Failed to react to comment: {e:?}");
            }
            let body = format!("Error executing command: {message}");
            if let Err(e) = source_control.create_comment(comments_url, &body).await {
                tracing::error!("Failed to post command error: {e:?}");
            }
            bail!("Command failed: {message}")
        }
    }
}

/// Body of `POST /api/plot` and `POST /api/lift`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRequest {
    /// `owner/name` or a GitHub URL.
    pub repo: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub dir: String,
    #[serde(default)]
    pub workspace: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub stack: String,
    #[serde(default)]
    pub extra_args: Option<String>,
}

impl ApiRequest {
    /// Workspace identifiers to match against; the default workspace when
    /// none is given.
    fn workspace_keys(&self) -> Vec<&str> {
        let keys = [&self.workspace, &self.environment, &self.stack]
            .into_iter()
            .filter(|k| !k.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>();
        if keys.is_empty() { vec![""] } else { keys }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub check_url: String,
    pub context: String,
}

/// Run `command` for a single project at an arbitrary ref.
pub async fn process_api_request(
    ctx: &JobContext,
    command: Command,
    request: &ApiRequest,
) -> Result<ApiResponse> {
    let Some((owner, name)) = parse_repository(&request.repo) else {
        bail!("invalid repository {:?}", request.repo);
    };
    let repo = Repository::from_full_name(&format!("{owner}/{name}"));
    let commit = ctx
        .source_control
        .get_commit(&repo, &request.git_ref)
        .await
        .with_context(|| format!("Failed to resolve {}", request.git_ref))?;
    let config = load_config(ctx, &repo, &commit.sha).await?;
    let project = config
        .find_project(&request.dir, &request.workspace_keys())
        .with_context(|| format!("project {} not found", request.dir))?;
    tracing::info!("API {command} for {}/{} at {}", repo.full_name, project.dir, commit.sha);

    let target = TriggerTarget {
        repo: &repo,
        source: &repo,
        head_ref: &request.git_ref,
        sha: &commit.sha,
        comments_url: &commit.comments_url,
        extra_args: request.extra_args.as_deref(),
    };
    match trigger_project(ctx, &target, project, command).await {
        TriggerOutcome::Dispatched { check, .. } => {
            Ok(ApiResponse { check_url: check.url, context: check.context })
        }
        TriggerOutcome::CheckFailed { error, .. } => Err(error),
        TriggerOutcome::DispatchFailed { error, .. } => Err(error.context(DISPATCH_FAILED)),
    }
}
