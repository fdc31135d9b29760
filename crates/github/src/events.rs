//! The parts of GitHub webhook payloads turnip acts on, mapped from
//! octocrab's webhook models.

use anyhow::{Context, Result};
use octocrab::models::{
    self, issues,
    pulls::{self, Base, Head},
    webhook_events::{
        WebhookEvent, WebhookEventPayload,
        payload::{IssueCommentWebhookEventAction, PullRequestWebhookEventAction},
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub full_name: String,
    pub clone_url: String,
}

impl Repository {
    /// Repository addressed by `owner/name` only, as the API trigger gets it.
    pub fn from_full_name(full_name: &str) -> Self {
        Self {
            full_name: full_name.to_string(),
            clone_url: format!("https://github.com/{full_name}.git"),
        }
    }

    pub fn owner(&self) -> &str { self.full_name.split_once('/').map_or("", |(o, _)| o) }

    pub fn name(&self) -> &str {
        self.full_name.split_once('/').map_or(self.full_name.as_str(), |(_, n)| n)
    }

    /// Commit status route for `sha`.
    pub fn status_url(&self, sha: &str) -> String {
        format!("/repos/{}/statuses/{sha}", self.full_name)
    }
}

impl TryFrom<&models::Repository> for Repository {
    type Error = anyhow::Error;

    fn try_from(repo: &models::Repository) -> Result<Self> {
        let full_name = repo
            .full_name
            .clone()
            .with_context(|| format!("repository {} has no full name", repo.name))?;
        let clone_url = repo
            .clone_url
            .as_ref()
            .map(|url| url.to_string())
            .unwrap_or_else(|| format!("https://github.com/{full_name}.git"));
        Ok(Self { full_name, clone_url })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub git_ref: String,
    pub sha: String,
    /// Missing when the fork was deleted.
    pub repo: Option<Repository>,
}

impl Branch {
    fn new(git_ref: &str, sha: &str, repo: Option<&models::Repository>) -> Self {
        Self {
            git_ref: git_ref.to_string(),
            sha: sha.to_string(),
            repo: repo.and_then(|r| Repository::try_from(r).ok()),
        }
    }
}

impl From<&Head> for Branch {
    fn from(head: &Head) -> Self { Self::new(&head.ref_field, &head.sha, head.repo.as_ref()) }
}

impl From<&Base> for Branch {
    fn from(base: &Base) -> Self { Self::new(&base.ref_field, &base.sha, base.repo.as_ref()) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub url: String,
    pub number: u64,
    pub head: Branch,
    pub base: Branch,
    pub comments_url: String,
}

impl PullRequest {
    /// Repository the head branch lives in, falling back to the base.
    pub fn head_repository(&self) -> Option<&Repository> {
        self.head.repo.as_ref().or(self.base.repo.as_ref())
    }
}

impl From<&pulls::PullRequest> for PullRequest {
    fn from(pr: &pulls::PullRequest) -> Self {
        let url = pr.url.to_string();
        let comments_url = pr
            .comments_url
            .as_ref()
            .map(|u| u.to_string())
            .unwrap_or_else(|| format!("{}/comments", url.replacen("/pulls/", "/issues/", 1)));
        Self {
            number: pr.number,
            head: Branch::from(pr.head.as_ref()),
            base: Branch::from(pr.base.as_ref()),
            comments_url,
            url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestEvent {
    pub action: String,
    pub number: u64,
    pub pull_request: PullRequest,
    pub repository: Repository,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueCommentEvent {
    pub action: String,
    pub issue: Issue,
    pub comment: Comment,
    pub repository: Repository,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub number: u64,
    pub comments_url: String,
    /// Present only when the issue is a pull request.
    pub pull_request: Option<IssuePullRequest>,
}

impl From<&issues::Issue> for Issue {
    fn from(issue: &issues::Issue) -> Self {
        Self {
            number: issue.number,
            comments_url: issue.comments_url.to_string(),
            pull_request: issue
                .pull_request
                .as_ref()
                .map(|link| IssuePullRequest { url: link.url.to_string() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuePullRequest {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: u64,
    pub body: String,
    pub reactions_url: String,
}

impl Comment {
    fn new(comment: &issues::Comment, repository: &Repository) -> Self {
        let id = comment.id.into_inner();
        Self {
            id,
            body: comment.body.clone().unwrap_or_default(),
            reactions_url: format!("/repos/{}/issues/comments/{id}/reactions", repository.full_name),
        }
    }
}

fn pull_request_action(action: &PullRequestWebhookEventAction) -> &'static str {
    match action {
        PullRequestWebhookEventAction::Opened => "opened",
        PullRequestWebhookEventAction::Synchronize => "synchronize",
        PullRequestWebhookEventAction::Reopened => "reopened",
        PullRequestWebhookEventAction::Closed => "closed",
        PullRequestWebhookEventAction::Edited => "edited",
        _ => "other",
    }
}

fn issue_comment_action(action: &IssueCommentWebhookEventAction) -> &'static str {
    match action {
        IssueCommentWebhookEventAction::Created => "created",
        IssueCommentWebhookEventAction::Edited => "edited",
        IssueCommentWebhookEventAction::Deleted => "deleted",
        _ => "other",
    }
}

/// The webhook deliveries turnip acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    PullRequest(Box<PullRequestEvent>),
    IssueComment(Box<IssueCommentEvent>),
    Ping,
    Other(String),
}

impl Event {
    /// Parse a delivery body according to its `X-GitHub-Event` kind. Only
    /// the kinds turnip handles are deserialized.
    pub fn parse(kind: &str, body: &[u8]) -> Result<Self> {
        match kind {
            "pull_request" | "issue_comment" => {
                let event = WebhookEvent::try_from_header_and_body(kind, body)
                    .with_context(|| format!("Invalid {kind} payload"))?;
                Self::from_webhook(kind, event)
            }
            "ping" => Ok(Self::Ping),
            other => Ok(Self::Other(other.to_string())),
        }
    }

    pub fn from_webhook(kind: &str, event: WebhookEvent) -> Result<Self> {
        let Some(repository) = &event.repository else {
            return Ok(Self::Other(kind.to_string()));
        };
        let repository = Repository::try_from(repository)?;
        Ok(match &event.specific {
            WebhookEventPayload::PullRequest(payload) => {
                Self::PullRequest(Box::new(PullRequestEvent {
                    action: pull_request_action(&payload.action).to_string(),
                    number: payload.number,
                    pull_request: PullRequest::from(&payload.pull_request),
                    repository,
                }))
            }
            WebhookEventPayload::IssueComment(payload) => {
                Self::IssueComment(Box::new(IssueCommentEvent {
                    action: issue_comment_action(&payload.action).to_string(),
                    issue: Issue::from(&payload.issue),
                    comment: Comment::new(&payload.comment, &repository),
                    repository,
                }))
            }
            _ => Self::Other(kind.to_string()),
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::PullRequest(_) => "pull_request",
            Self::IssueComment(_) => "issue_comment",
            Self::Ping => "ping",
            Self::Other(kind) => kind,
        }
    }
}
