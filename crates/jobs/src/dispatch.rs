use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use turnip_core::{config::SchedulerConfig, models::Command, util::normalize_name};
use turnip_yaml::Project;

pub const ENV_CLONE_URL: &str = "TURNIP_CLONE_URL";
pub const ENV_HEAD_REF: &str = "TURNIP_HEAD_REF";
pub const ENV_COMMAND: &str = "TURNIP_COMMAND";
pub const ENV_CHECK_URL: &str = "TURNIP_CHECK_URL";
pub const ENV_CHECK_NAME: &str = "TURNIP_CHECK_NAME";
pub const ENV_PROJECT_YAML: &str = "TURNIP_PROJECT_YAML";
pub const ENV_SERVER_NAME: &str = "TURNIP_SERVER_NAME";
pub const ENV_COMMENTS_URL: &str = "TURNIP_COMMENTS_URL";
pub const ENV_EXTRA_ARGS: &str = "TURNIP_EXTRA_ARGS";

const MAX_GENERATE_NAME: usize = 47;

/// What to run, where, and whom to report to.
#[derive(Debug, Clone)]
pub struct JobRequest<'a> {
    pub command: Command,
    pub repo_full_name: &'a str,
    pub clone_url: &'a str,
    pub head_ref: &'a str,
    pub check_url: &'a str,
    pub check_name: &'a str,
    pub comments_url: &'a str,
    pub project: &'a Project,
    pub extra_args: Option<&'a str>,
}

/// The job description handed to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDispatch {
    pub generate_name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub image: String,
    /// Secret whose keys are exposed to the job as environment variables.
    pub env_from_secret: String,
    pub ttl_seconds_after_finished: u32,
    pub env: BTreeMap<String, String>,
}

impl JobDispatch {
    pub fn new(request: &JobRequest, config: &SchedulerConfig, server_name: &str) -> Result<Self> {
        let project_yaml = request
            .project
            .to_yaml()
            .with_context(|| format!("Failed to serialize project {}", request.project.dir))?;
        let command = request.command.as_str();

        let labels = BTreeMap::from([
            ("app".to_string(), "turnip".to_string()),
            ("turnip.ivan.vc/repo".to_string(), normalize_name(request.repo_full_name)),
            ("turnip.ivan.vc/command".to_string(), command.to_string()),
        ]);
        let mut annotations = config.pod_annotations.clone();
        annotations.extend(request.project.loaded_workflow.pod_annotations.clone());
        annotations.extend(request.project.pod_annotations.clone());

        let mut env = BTreeMap::from([
            (ENV_CLONE_URL.to_string(), request.clone_url.to_string()),
            (ENV_HEAD_REF.to_string(), request.head_ref.to_string()),
            (ENV_COMMAND.to_string(), command.to_string()),
            (ENV_CHECK_URL.to_string(), request.check_url.to_string()),
            (ENV_CHECK_NAME.to_string(), request.check_name.to_string()),
            (ENV_PROJECT_YAML.to_string(), project_yaml),
            (ENV_SERVER_NAME.to_string(), server_name.to_string()),
            (ENV_COMMENTS_URL.to_string(), request.comments_url.to_string()),
        ]);
        if let Some(extra_args) = request.extra_args.filter(|a| !a.is_empty()) {
            env.insert(ENV_EXTRA_ARGS.to_string(), extra_args.to_string());
        }

        Ok(Self {
            generate_name: generate_name(request.command, request.repo_full_name, &request.project.dir),
            namespace: config.namespace.clone(),
            labels,
            annotations,
            image: config.runner_image.clone(),
            env_from_secret: config.job_secrets_name.clone(),
            ttl_seconds_after_finished: config.ttl_seconds_after_finished,
            env,
        })
    }

    pub fn check_url(&self) -> Option<&str> { self.env.get(ENV_CHECK_URL).map(String::as_str) }

    pub fn check_name(&self) -> Option<&str> { self.env.get(ENV_CHECK_NAME).map(String::as_str) }
}

/// Name prefix for the scheduled job, `turnip-{command}-{repo}-{dir}-`,
/// kept short enough for the scheduler to append a random suffix.
pub fn generate_name(command: Command, repo_full_name: &str, dir: &str) -> String {
    let mut name = format!("turnip-{command}-{}-", repo_full_name.to_lowercase());
    let dir = dir.trim_matches('/');
    if !dir.is_empty() && dir != "." {
        name.push_str(&dir.to_lowercase());
        name.push('-');
    }
    let mut name = normalize_name(&name);
    if name.len() > MAX_GENERATE_NAME {
        let mut end = MAX_GENERATE_NAME - 1;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
        name.truncate(name.trim_end_matches('-').len());
        name.push('-');
    }
    name
}

/// Runs dispatched jobs as isolated workloads.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Submit a job and return the name the scheduler assigned to it.
    async fn dispatch(&self, job: &JobDispatch) -> Result<String>;
}

/// Scheduler reached over HTTP: the dispatch record is POSTed as JSON and
/// the response carries the created job's name.
pub struct HttpScheduler {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct DispatchResponse {
    name: String,
}

impl HttpScheduler {
    pub fn new(config: &SchedulerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("turnip/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create scheduler client")?;
        Ok(Self { client, url: config.url.clone(), token: config.token.clone() })
    }
}

#[async_trait]
impl JobScheduler for HttpScheduler {
    async fn dispatch(&self, job: &JobDispatch) -> Result<String> {
        let mut request = self.client.post(&self.url).json(job);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("Failed to dispatch job {}", job.generate_name))?;
        let response: DispatchResponse =
            response.json().await.context("Failed to parse scheduler response")?;
        Ok(response.name)
    }
}
