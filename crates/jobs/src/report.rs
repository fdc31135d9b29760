use std::{fmt::Write, sync::Arc, time::Duration};

use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use turnip_core::models::JobStatus;
use turnip_github::SourceControl;

use crate::check_run::{finish_check_run, start_check_run};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStartedRequest {
    pub check_url: String,
    pub check_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFinishedRequest {
    pub check_url: String,
    pub check_name: String,
    pub status: JobStatus,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub comments_url: String,
    pub command: String,
    pub project_dir: String,
    #[serde(default)]
    pub project_workspace: String,
}

impl JobFinishedRequest {
    fn key(&self) -> String { format!("{}/{}", self.check_url, self.check_name) }
}

/// Check runs whose completion was reported recently. Entries expire after
/// the configured window.
#[derive(Clone)]
pub struct FinishedJobs {
    cache: Cache<String, ()>,
}

impl FinishedJobs {
    pub fn new(ttl: Duration) -> Self { Self { cache: Cache::builder().time_to_live(ttl).build() } }

    /// Atomically mark `key`, returning whether it was already present.
    pub fn check_and_mark(&self, key: &str) -> bool {
        !self.cache.entry(key.to_string()).or_insert(()).is_fresh()
    }

    pub fn remove(&self, key: &str) { self.cache.invalidate(key) }
}

/// Evicts the marked key unless the completion ran to the end, so a
/// cancelled report can be retried.
struct Completion<'a> {
    finished: &'a FinishedJobs,
    key: &'a str,
    done: bool,
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        if !self.done {
            tracing::warn!("Completion of {} interrupted, forgetting it", self.key);
            self.finished.remove(self.key);
        }
    }
}

/// Result comment posted when a job finishes.
pub fn finished_comment(request: &JobFinishedRequest) -> String {
    let mut comment = format!(
        "Ran {} for {} {}\n\nStatus: {}",
        request.command, request.project_dir, request.project_workspace, request.status
    );
    comment.push_str("\n\n<details><summary>Show Output</summary>\n\n");
    if !request.output.is_empty() {
        let _ = writeln!(comment, "```diff\n{}\n```", request.output);
    }
    if !request.error.is_empty() {
        let _ = writeln!(comment, "Error:\n```\n{}\n```", request.error);
    }
    comment.push_str("</details>");
    comment
}

/// Handles the reports dispatched jobs send back.
#[derive(Clone)]
pub struct ReportService {
    source_control: Arc<dyn SourceControl>,
    finished: FinishedJobs,
}

impl ReportService {
    pub fn new(source_control: Arc<dyn SourceControl>, dedup_ttl: Duration) -> Self {
        Self { source_control, finished: FinishedJobs::new(dedup_ttl) }
    }

    pub async fn job_started(&self, request: &JobStartedRequest) {
        tracing::info!("Job started: {}", request.check_name);
        start_check_run(self.source_control.as_ref(), &request.check_url, &request.check_name)
            .await;
    }

    /// Finish the check run and post the result comment, at most once per
    /// check run within the dedup window. Returns whether this call did the
    /// work. Upstream failures are logged, never returned.
    pub async fn job_finished(&self, request: &JobFinishedRequest) -> bool {
        let key = request.key();
        if self.finished.check_and_mark(&key) {
            tracing::info!("Ignoring duplicate completion of {}", request.check_name);
            return false;
        }
        let mut completion = Completion { finished: &self.finished, key: &key, done: false };
        tracing::info!("Job finished: {} ({})", request.check_name, request.status);

        let source_control = self.source_control.as_ref();
        if let Err(e) = finish_check_run(
            source_control,
            &request.check_url,
            &request.check_name,
            request.status.conclusion(),
        )
        .await
        {
            tracing::error!("{e:?}");
        }
        if request.comments_url.is_empty() {
            tracing::debug!("No comments URL for {}, skipping result comment", request.check_name);
        } else if let Err(e) =
            source_control.create_comment(&request.comments_url, &finished_comment(request)).await
        {
            tracing::error!("Failed to post result of {}: {e:?}", request.check_name);
        }
        completion.done = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use turnip_core::models::JobStatus;

    use super::*;
    use crate::testing::{FakeSourceControl, SlowSourceControl};

    fn finished(status: JobStatus) -> JobFinishedRequest {
        JobFinishedRequest {
            check_url: "/repos/acme/infra/statuses/abc".into(),
            check_name: "turnip/terraform/plan/infra/staging".into(),
            status,
            output: "+ aws_s3_bucket.logs".into(),
            error: String::new(),
            comments_url: "/repos/acme/infra/issues/7/comments".into(),
            command: "plan".into(),
            project_dir: "infra".into(),
            project_workspace: "staging".into(),
        }
    }

    #[test]
    fn test_finished_comment() {
        assert_eq!(
            finished_comment(&finished(JobStatus::Succeeded)),
            "Ran plan for infra staging\n\nStatus: Succeeded\n\n<details><summary>Show Output</summary>\n\n```diff\n+ aws_s3_bucket.logs\n```\n</details>"
        );
        let mut request = finished(JobStatus::Failed);
        request.output.clear();
        request.error = "exit status 1".into();
        assert_eq!(
            finished_comment(&request),
            "Ran plan for infra staging\n\nStatus: Failed\n\n<details><summary>Show Output</summary>\n\nError:\n```\nexit status 1\n```\n</details>"
        );
    }

    #[test]
    fn test_finished_request_wire_format() {
        let request: JobFinishedRequest = serde_json::from_str(
            r#"{"checkUrl":"u","checkName":"n","status":"FAILED","command":"apply","projectDir":"infra"}"#,
        )
        .unwrap();
        assert_eq!(request.status, JobStatus::Failed);
        assert!(request.output.is_empty() && request.project_workspace.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_finish_is_ignored() {
        let github = Arc::new(FakeSourceControl::default());
        let service = ReportService::new(github.clone(), Duration::from_secs(30));
        let request = finished(JobStatus::Succeeded);
        assert!(service.job_finished(&request).await);
        assert!(!service.job_finished(&request).await);

        let statuses = github.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].1.state, "success");
        assert_eq!(github.comments().len(), 1);

        let mut other = request.clone();
        other.check_name = "turnip/terraform/plan/infra/production".into();
        assert!(service.job_finished(&other).await);
        assert_eq!(github.comments().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates() {
        let github = Arc::new(FakeSourceControl::default());
        let service = ReportService::new(github.clone(), Duration::from_secs(30));
        let request = finished(JobStatus::Failed);
        let results = futures_util::future::join_all(
            (0..8).map(|_| {
                let service = service.clone();
                let request = request.clone();
                tokio::spawn(async move { service.job_finished(&request).await })
            }),
        )
        .await;
        let performed = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(performed, 1);
        assert_eq!(github.statuses().len(), 1);
        assert_eq!(github.comments().len(), 1);
    }

    #[tokio::test]
    async fn test_finish_after_window_is_new() {
        let github = Arc::new(FakeSourceControl::default());
        let service = ReportService::new(github.clone(), Duration::from_millis(100));
        let request = finished(JobStatus::Succeeded);
        assert!(service.job_finished(&request).await);
        assert!(!service.job_finished(&request).await);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(service.job_finished(&request).await);
        assert_eq!(github.comments().len(), 2);
    }

    #[tokio::test]
    async fn test_upstream_failures_do_not_fail_report() {
        let github = Arc::new(FakeSourceControl {
            fail_statuses: true,
            fail_comments: true,
            ..Default::default()
        });
        let service = ReportService::new(github, Duration::from_secs(30));
        assert!(service.job_finished(&finished(JobStatus::Succeeded)).await);
    }

    #[tokio::test]
    async fn test_cancelled_finish_is_forgotten() {
        let github = Arc::new(SlowSourceControl::default());
        let service = ReportService::new(github.clone(), Duration::from_secs(30));
        let request = finished(JobStatus::Succeeded);
        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), service.job_finished(&request)).await;
        assert!(cancelled.is_err());

        github.release();
        assert!(service.job_finished(&request).await);
    }

    #[tokio::test]
    async fn test_job_started() {
        let github = Arc::new(FakeSourceControl::default());
        let service = ReportService::new(github.clone(), Duration::from_secs(30));
        let request = JobStartedRequest { check_url: "/s/abc".into(), check_name: "ctx".into() };
        service.job_started(&request).await;
        service.job_started(&request).await;
        let statuses = github.statuses();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(|(_, s)| s.description == "Turnip is running"));
    }
}
