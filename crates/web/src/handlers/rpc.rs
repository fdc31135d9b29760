use axum::{Json, extract::State};
use serde::Serialize;
use turnip_jobs::{JobFinishedRequest, JobStartedRequest, ReportService};

#[derive(Serialize)]
pub struct Empty {}

pub async fn job_started(
    State(reports): State<ReportService>,
    Json(request): Json<JobStartedRequest>,
) -> Json<Empty> {
    reports.job_started(&request).await;
    Json(Empty {})
}

/// Always succeeds, duplicates included, so the job never retries over a
/// notification failure.
pub async fn job_finished(
    State(reports): State<ReportService>,
    Json(request): Json<JobFinishedRequest>,
) -> Json<Empty> {
    reports.job_finished(&request).await;
    Json(Empty {})
}
