pub mod events;
pub mod webhook;

use std::{
    fmt::Display,
    future::Future,
    sync::{Arc, OnceLock},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use events::{PullRequest, Repository};
use octocrab::Octocrab;
use regex::Regex;
use serde::{Deserialize, Serialize};
use turnip_core::{config::GitHubConfig, util::api_route};
use turnip_trigger::ChangedFile;

/// A commit status as shown on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStatus {
    pub state: String,
    pub description: String,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub comments_url: String,
}

/// Reactions turnip leaves on chat commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    ThumbsUp,
    Confused,
}

impl Reaction {
    pub fn content(&self) -> &'static str {
        match self {
            Self::ThumbsUp => "+1",
            Self::Confused => "confused",
        }
    }
}

/// Everything turnip needs from the source-control host.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Raw contents of `path` at `git_ref`.
    async fn fetch_file(&self, repo: &Repository, path: &str, git_ref: &str) -> Result<Vec<u8>>;

    async fn list_pull_request_files(
        &self,
        repo: &Repository,
        number: u64,
    ) -> Result<Vec<ChangedFile>>;

    async fn get_pull_request(&self, url: &str) -> Result<PullRequest>;

    async fn get_commit(&self, repo: &Repository, git_ref: &str) -> Result<CommitInfo>;

    async fn create_status(&self, url: &str, status: &CommitStatus) -> Result<()>;

    async fn create_comment(&self, comments_url: &str, body: &str) -> Result<()>;

    async fn react(&self, reactions_url: &str, reaction: Reaction) -> Result<()>;
}

#[derive(Clone)]
pub struct GitHub {
    pub client: Octocrab,
    timeout: Duration,
}

#[derive(Serialize)]
struct PageParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    per_page: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
}

#[derive(Serialize)]
struct RefParams<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
}

#[derive(Deserialize)]
struct ContentResponse {
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Deserialize)]
struct PullRequestFile {
    filename: String,
    status: String,
    #[serde(default)]
    previous_filename: Option<String>,
}

impl From<PullRequestFile> for ChangedFile {
    fn from(file: PullRequestFile) -> Self {
        match (file.status.as_str(), file.previous_filename) {
            ("removed", _) => ChangedFile::Deleted { old_path: file.filename },
            ("added" | "copied", _) => ChangedFile::Added { path: file.filename },
            ("renamed", Some(old_path)) => ChangedFile::Renamed { old_path, new_path: file.filename },
            _ => ChangedFile::Modified { path: file.filename },
        }
    }
}

const FILES_PER_PAGE: u8 = 100;
/// GitHub stops listing pull request files after 3000 entries.
const MAX_FILE_PAGES: u32 = 30;

impl GitHub {
    pub async fn new(config: &GitHubConfig) -> Result<Arc<Self>> {
        let client = Octocrab::builder()
            .personal_token(config.token.clone())
            .build()
            .context("Failed to create GitHub client")?;
        let profile = client.current().user().await.context("Failed to fetch current user")?;
        tracing::info!("Logged in as {}", profile.login);
        Ok(Arc::new(Self { client, timeout: config.api_timeout() }))
    }

    async fn bounded<T>(
        &self,
        what: impl Display,
        request: impl Future<Output = octocrab::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result.with_context(|| format!("Failed to {what}")),
            Err(_) => Err(anyhow!("Timed out trying to {what}")),
        }
    }

    async fn post_json(&self, what: &str, url: &str, body: &impl Serialize) -> Result<()> {
        let route = api_route(url)?;
        let _: serde_json::Value = self.bounded(what, self.client.post(route, Some(body))).await?;
        Ok(())
    }
}

#[async_trait]
impl SourceControl for GitHub {
    async fn fetch_file(&self, repo: &Repository, path: &str, git_ref: &str) -> Result<Vec<u8>> {
        let route = format!("/repos/{}/contents/{}", repo.full_name, path.trim_start_matches('/'));
        let response: ContentResponse = self
            .bounded(
                format!("fetch {path} from {}@{git_ref}", repo.full_name),
                self.client.get(route, Some(&RefParams { git_ref })),
            )
            .await?;
        if !response.encoding.is_empty() && response.encoding != "base64" {
            return Err(anyhow!("Unsupported content encoding {}", response.encoding));
        }
        let content = response.content.replace(['\n', '\r'], "");
        STANDARD.decode(content).with_context(|| format!("Failed to decode {path}"))
    }

    async fn list_pull_request_files(
        &self,
        repo: &Repository,
        number: u64,
    ) -> Result<Vec<ChangedFile>> {
        let route = format!("/repos/{}/pulls/{number}/files", repo.full_name);
        let mut files = Vec::new();
        for page in 1..=MAX_FILE_PAGES {
            let response: Vec<PullRequestFile> = self
                .bounded(
                    format!("list files of {}#{number}", repo.full_name),
                    self.client.get(
                        &route,
                        Some(&PageParams { per_page: Some(FILES_PER_PAGE), page: Some(page) }),
                    ),
                )
                .await?;
            let count = response.len();
            files.extend(response.into_iter().map(ChangedFile::from));
            if count < FILES_PER_PAGE as usize {
                break;
            }
        }
        Ok(files)
    }

    async fn get_pull_request(&self, url: &str) -> Result<PullRequest> {
        let route = api_route(url)?;
        let pr: octocrab::models::pulls::PullRequest = self
            .bounded(format!("fetch pull request {url}"), self.client.get(route, None::<&()>))
            .await?;
        Ok(PullRequest::from(&pr))
    }

    async fn get_commit(&self, repo: &Repository, git_ref: &str) -> Result<CommitInfo> {
        let route = format!("/repos/{}/commits/{git_ref}", repo.full_name);
        self.bounded(
            format!("fetch commit {}@{git_ref}", repo.full_name),
            self.client.get(route, None::<&()>),
        )
        .await
    }

    async fn create_status(&self, url: &str, status: &CommitStatus) -> Result<()> {
        self.post_json("create commit status", url, status).await
    }

    async fn create_comment(&self, comments_url: &str, body: &str) -> Result<()> {
        #[derive(Serialize)]
        struct CommentBody<'a> {
            body: &'a str,
        }
        self.post_json("create comment", comments_url, &CommentBody { body }).await
    }

    async fn react(&self, reactions_url: &str, reaction: Reaction) -> Result<()> {
        #[derive(Serialize)]
        struct ReactionBody {
            content: &'static str,
        }
        self.post_json("react to comment", reactions_url, &ReactionBody {
            content: reaction.content(),
        })
        .await
    }
}

/// Accepts `owner/name` or a GitHub URL and returns `(owner, name)`.
pub fn parse_repository(value: &str) -> Option<(&str, &str)> {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let caps = REGEX
        .get_or_init(|| {
            Regex::new(
                r"^(?:https?://github\.com/)?(?P<owner>[A-Za-z0-9_.-]+)/(?P<repo>[A-Za-z0-9_.-]+?)(?:\.git)?/?$",
            )
            .unwrap()
        })
        .captures(value)?;
    let owner = caps.name("owner").map(|m| m.as_str()).unwrap_or_default();
    let repo = caps.name("repo").map(|m| m.as_str()).unwrap_or_default();
    Some((owner, repo))
}
