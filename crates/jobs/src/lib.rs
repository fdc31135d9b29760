pub mod check_run;
pub mod dispatch;
pub mod handlers;
pub mod report;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod trigger;

use std::sync::Arc;

use anyhow::Result;
pub use dispatch::{HttpScheduler, JobDispatch, JobScheduler};
pub use handlers::{
    ApiRequest, ApiResponse, process_api_request, process_issue_comment, process_pull_request,
};
pub use report::{JobFinishedRequest, JobStartedRequest, ReportService};
use turnip_core::config::Config;
use turnip_github::SourceControl;
pub use trigger::TriggerOutcome;

/// Shared context available to all event handlers.
#[derive(Clone)]
pub struct JobContext {
    pub config: Arc<Config>,
    pub source_control: Arc<dyn SourceControl>,
    pub scheduler: Arc<dyn JobScheduler>,
}

impl JobContext {
    /// Context backed by the HTTP scheduler from `config`.
    pub fn new(config: Arc<Config>, source_control: Arc<dyn SourceControl>) -> Result<Self> {
        let scheduler = Arc::new(HttpScheduler::new(&config.scheduler)?);
        Ok(Self { config, source_control, scheduler })
    }

    pub fn report_service(&self) -> ReportService {
        ReportService::new(self.source_control.clone(), self.config.reporting.dedup_ttl())
    }
}
