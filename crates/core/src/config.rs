use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
    /// Address dispatched jobs use to reach the status reporting service.
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Enables the `/api/plot` and `/api/lift` endpoints when set.
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubConfig {
    pub token: String,
    pub webhook_secret: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub api_timeout_secs: u64,
}

impl GitHubConfig {
    pub fn api_timeout(&self) -> Duration { Duration::from_secs(self.api_timeout_secs) }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    pub url: String,
    pub token: Option<String>,
    pub namespace: String,
    #[serde(default = "default_job_secrets_name")]
    pub job_secrets_name: String,
    #[serde(default = "default_job_ttl")]
    pub ttl_seconds_after_finished: u32,
    #[serde(default = "default_runner_image")]
    pub runner_image: String,
    #[serde(default)]
    pub pod_annotations: BTreeMap<String, String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl SchedulerConfig {
    pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportingConfig {
    /// How long a finished report for a check run suppresses duplicates.
    pub dedup_ttl_secs: u64,
}

impl Default for ReportingConfig {
    fn default() -> Self { Self { dedup_ttl_secs: 30 } }
}

impl ReportingConfig {
    pub fn dedup_ttl(&self) -> Duration { Duration::from_secs(self.dedup_ttl_secs) }
}

fn default_rpc_port() -> u16 { 50001 }

fn default_server_name() -> String { "turnip".to_string() }

fn default_timeout_secs() -> u64 { 30 }

fn default_job_secrets_name() -> String { "turnip-runner-job-secrets".to_string() }

fn default_job_ttl() -> u32 { 300 }

fn default_runner_image() -> String { "ivan/turnip:latest".to_string() }
