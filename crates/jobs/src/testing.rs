//! In-memory source control and scheduler doubles that record every call.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use tokio::sync::Semaphore;
use turnip_core::config::{
    Config, GitHubConfig, ReportingConfig, SchedulerConfig, ServerConfig,
};
use turnip_github::{
    CommitInfo, CommitStatus, Reaction, SourceControl,
    events::{Branch, PullRequest, Repository},
};
use turnip_trigger::ChangedFile;
use turnip_yaml::Project;

use crate::{
    JobContext,
    dispatch::{JobDispatch, JobScheduler},
};

#[derive(Default)]
pub struct FakeSourceControl {
    /// File contents by path, served for any ref.
    pub files: HashMap<String, String>,
    pub changed_files: Vec<ChangedFile>,
    pub pull_request: Option<PullRequest>,
    pub commit: Option<CommitInfo>,
    pub fail_statuses: bool,
    pub fail_comments: bool,
    pub fetched: Mutex<Vec<(String, String)>>,
    pub statuses: Mutex<Vec<(String, CommitStatus)>>,
    pub comments: Mutex<Vec<(String, String)>>,
    pub reactions: Mutex<Vec<(String, Reaction)>>,
}

impl FakeSourceControl {
    pub fn with_file(mut self, path: &str, contents: &str) -> Self {
        self.files.insert(path.to_string(), contents.to_string());
        self
    }

    pub fn with_changes(mut self, paths: &[&str]) -> Self {
        self.changed_files = paths.iter().map(|&p| ChangedFile::from(p)).collect();
        self
    }

    /// `(path, ref)` pairs of every fetched file.
    pub fn fetched(&self) -> Vec<(String, String)> { self.fetched.lock().unwrap().clone() }

    pub fn statuses(&self) -> Vec<(String, CommitStatus)> { self.statuses.lock().unwrap().clone() }

    pub fn comments(&self) -> Vec<(String, String)> { self.comments.lock().unwrap().clone() }

    pub fn reactions(&self) -> Vec<(String, Reaction)> { self.reactions.lock().unwrap().clone() }
}

#[async_trait]
impl SourceControl for FakeSourceControl {
    async fn fetch_file(&self, repo: &Repository, path: &str, git_ref: &str) -> Result<Vec<u8>> {
        self.fetched.lock().unwrap().push((path.to_string(), git_ref.to_string()));
        self.files
            .get(path)
            .map(|c| c.as_bytes().to_vec())
            .ok_or_else(|| anyhow!("{path} not found in {}", repo.full_name))
    }

    async fn list_pull_request_files(&self, _: &Repository, _: u64) -> Result<Vec<ChangedFile>> {
        Ok(self.changed_files.clone())
    }

    async fn get_pull_request(&self, url: &str) -> Result<PullRequest> {
        self.pull_request.clone().ok_or_else(|| anyhow!("pull request {url} not found"))
    }

    async fn get_commit(&self, repo: &Repository, git_ref: &str) -> Result<CommitInfo> {
        self.commit.clone().ok_or_else(|| anyhow!("{}@{git_ref} not found", repo.full_name))
    }

    async fn create_status(&self, url: &str, status: &CommitStatus) -> Result<()> {
        if self.fail_statuses {
            bail!("status API unavailable");
        }
        self.statuses.lock().unwrap().push((url.to_string(), status.clone()));
        Ok(())
    }

    async fn create_comment(&self, comments_url: &str, body: &str) -> Result<()> {
        if self.fail_comments {
            bail!("comment API unavailable");
        }
        self.comments.lock().unwrap().push((comments_url.to_string(), body.to_string()));
        Ok(())
    }

    async fn react(&self, reactions_url: &str, reaction: Reaction) -> Result<()> {
        self.reactions.lock().unwrap().push((reactions_url.to_string(), reaction));
        Ok(())
    }
}

/// Source control whose status updates block until [`SlowSourceControl::release`].
pub struct SlowSourceControl {
    gate: Semaphore,
    pub inner: FakeSourceControl,
}

impl Default for SlowSourceControl {
    fn default() -> Self { Self { gate: Semaphore::new(0), inner: FakeSourceControl::default() } }
}

impl SlowSourceControl {
    pub fn release(&self) { self.gate.add_permits(Semaphore::MAX_PERMITS / 2) }
}

#[async_trait]
impl SourceControl for SlowSourceControl {
    async fn fetch_file(&self, repo: &Repository, path: &str, git_ref: &str) -> Result<Vec<u8>> {
        self.inner.fetch_file(repo, path, git_ref).await
    }

    async fn list_pull_request_files(
        &self,
        repo: &Repository,
        number: u64,
    ) -> Result<Vec<ChangedFile>> {
        self.inner.list_pull_request_files(repo, number).await
    }

    async fn get_pull_request(&self, url: &str) -> Result<PullRequest> {
        self.inner.get_pull_request(url).await
    }

    async fn get_commit(&self, repo: &Repository, git_ref: &str) -> Result<CommitInfo> {
        self.inner.get_commit(repo, git_ref).await
    }

    async fn create_status(&self, url: &str, status: &CommitStatus) -> Result<()> {
        let _permit = self.gate.acquire().await?;
        self.inner.create_status(url, status).await
    }

    async fn create_comment(&self, comments_url: &str, body: &str) -> Result<()> {
        self.inner.create_comment(comments_url, body).await
    }

    async fn react(&self, reactions_url: &str, reaction: Reaction) -> Result<()> {
        self.inner.react(reactions_url, reaction).await
    }
}

#[derive(Default)]
pub struct FakeScheduler {
    pub fail: bool,
    pub jobs: Mutex<Vec<JobDispatch>>,
}

impl FakeScheduler {
    pub fn jobs(&self) -> Vec<JobDispatch> { self.jobs.lock().unwrap().clone() }
}

#[async_trait]
impl JobScheduler for FakeScheduler {
    async fn dispatch(&self, job: &JobDispatch) -> Result<String> {
        if self.fail {
            bail!("scheduler unavailable");
        }
        let mut jobs = self.jobs.lock().unwrap();
        jobs.push(job.clone());
        Ok(format!("{}{}", job.generate_name, jobs.len()))
    }
}

pub fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        url: "http://scheduler.test/jobs".to_string(),
        token: None,
        namespace: "turnip".to_string(),
        job_secrets_name: "turnip-runner-job-secrets".to_string(),
        ttl_seconds_after_finished: 300,
        runner_image: "ivan/turnip:latest".to_string(),
        pod_annotations: BTreeMap::new(),
        timeout_secs: 5,
    }
}

pub fn server_config() -> Config {
    Config {
        server: ServerConfig {
            port: 8080,
            rpc_port: 50001,
            name: "turnip.test:50001".to_string(),
            api_token: Some("api-token".to_string()),
        },
        github: GitHubConfig {
            token: "token".to_string(),
            webhook_secret: None,
            api_timeout_secs: 5,
        },
        scheduler: scheduler_config(),
        reporting: ReportingConfig::default(),
    }
}

/// A Terraform project bound to an allowed workflow.
pub fn project(dir: &str, workspace: &str) -> Project {
    let yaml = format!(
        "version: v1alpha1\nworkflows:\n  tf: {{terraform: {{version: 1.7.5}}, image: alpine}}\nprojects:\n  - {{dir: {dir:?}, workspace: {workspace:?}, workflow: tf, autoPlan: true}}\n"
    );
    match turnip_yaml::Config::load(yaml.as_bytes()) {
        Ok(mut config) => config.projects.remove(0),
        Err(e) => panic!("invalid test project: {e}"),
    }
}

pub fn repository() -> Repository {
    Repository {
        full_name: "acme/infra".to_string(),
        clone_url: "https://github.com/acme/infra.git".to_string(),
    }
}

pub fn pull_request(number: u64, head_sha: &str) -> PullRequest {
    PullRequest {
        url: format!("https://api.github.com/repos/acme/infra/pulls/{number}"),
        number,
        head: Branch { git_ref: "feature".to_string(), sha: head_sha.to_string(), repo: Some(repository()) },
        base: Branch { git_ref: "main".to_string(), sha: "base".to_string(), repo: Some(repository()) },
        comments_url: format!("https://api.github.com/repos/acme/infra/issues/{number}/comments"),
    }
}

pub fn context(
    source_control: FakeSourceControl,
    scheduler: FakeScheduler,
) -> (JobContext, Arc<FakeSourceControl>, Arc<FakeScheduler>) {
    let source_control = Arc::new(source_control);
    let scheduler = Arc::new(scheduler);
    let ctx = JobContext {
        config: Arc::new(server_config()),
        source_control: source_control.clone(),
        scheduler: scheduler.clone(),
    };
    (ctx, source_control, scheduler)
}

/// Like [`context`], over a source control that holds status updates.
pub fn slow_context(
    source_control: SlowSourceControl,
    scheduler: FakeScheduler,
) -> (JobContext, Arc<SlowSourceControl>, Arc<FakeScheduler>) {
    let source_control = Arc::new(source_control);
    let scheduler = Arc::new(scheduler);
    let ctx = JobContext {
        config: Arc::new(server_config()),
        source_control: source_control.clone(),
        scheduler: scheduler.clone(),
    };
    (ctx, source_control, scheduler)
}
