use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

mod api;
mod rpc;
mod webhook;

pub use webhook::drain_events;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/github/webhook", post(webhook::webhook))
        .route("/api/plot", post(api::plot))
        .route("/api/lift", post(api::lift))
}

/// Routes called back by dispatched jobs.
pub fn build_rpc_router() -> Router<AppState> {
    Router::new()
        .route("/rpc/ReportJobStarted", post(rpc::job_started))
        .route("/rpc/ReportJobFinished", post(rpc::job_finished))
}

async fn health() -> &'static str { "ok" }
