use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use turnip_core::{AppError, models::Command};
use turnip_github::webhook::verify_token;
use turnip_jobs::{ApiRequest, JobContext, process_api_request};

fn authorize(jobs: &JobContext, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = &jobs.config.server.api_token else {
        return Err(AppError::Message(StatusCode::NOT_IMPLEMENTED, "API is disabled".to_string()));
    };
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if !token.is_some_and(|token| verify_token(expected, token)) {
        return Err(AppError::Status(StatusCode::UNAUTHORIZED));
    }
    Ok(())
}

async fn trigger(
    jobs: &JobContext,
    headers: &HeaderMap,
    body: &[u8],
    command: Command,
) -> Result<Response, AppError> {
    authorize(jobs, headers)?;
    let request: ApiRequest = serde_json::from_slice(body).map_err(|e| {
        AppError::Message(StatusCode::UNPROCESSABLE_ENTITY, format!("invalid request: {e}"))
    })?;
    match process_api_request(jobs, command, &request).await {
        Ok(response) => Ok((StatusCode::CREATED, Json(response)).into_response()),
        Err(e) => {
            tracing::warn!("API {command} for {} {} failed: {e:#}", request.repo, request.dir);
            Err(AppError::Message(StatusCode::UNPROCESSABLE_ENTITY, format!("{e:#}")))
        }
    }
}

pub async fn plot(
    State(jobs): State<JobContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    trigger(&jobs, &headers, &body, Command::Plot).await
}

pub async fn lift(
    State(jobs): State<JobContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    trigger(&jobs, &headers, &body, Command::Lift).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, http::Request};
    use tower::ServiceExt;
    use turnip_github::CommitInfo;
    use turnip_jobs::{
        ApiResponse,
        testing::{FakeScheduler, FakeSourceControl},
    };

    use super::*;
    use crate::handlers::{
        build_router,
        tests::{body_string, state},
    };

    const CONFIG: &str = "version: v1alpha1\nworkflows:\n  tf: {terraform: {version: 1.7.5}, image: alpine}\nprojects:\n  - {dir: infra, workflow: tf, workspace: staging}\n";

    fn source_control() -> FakeSourceControl {
        FakeSourceControl {
            commit: Some(CommitInfo {
                sha: "fff000".into(),
                comments_url: "/repos/acme/infra/commits/fff000/comments".into(),
            }),
            ..Default::default()
        }
        .with_file("turnip.yaml", CONFIG)
    }

    fn request(path: &str, token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::post(path).header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_lift() {
        let (state, _, scheduler) = state(source_control(), FakeScheduler::default());
        let body = r#"{"repo":"acme/infra","ref":"main","dir":"infra","workspace":"staging"}"#;
        let response = build_router()
            .with_state(state)
            .oneshot(request("/api/lift", Some("api-token"), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let response: ApiResponse = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(response.context, "turnip/terraform/apply/infra/staging");
        assert_eq!(response.check_url, "/repos/acme/infra/statuses/fff000");
        assert_eq!(scheduler.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_authorization() {
        let (state, _, scheduler) = state(source_control(), FakeScheduler::default());
        let router = build_router().with_state(state.clone());
        let body = r#"{"repo":"acme/infra","ref":"main","dir":"infra","workspace":"staging"}"#;
        let response = router.clone().oneshot(request("/api/plot", None, body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        for token in ["wrong", "api-tokenx", "api-toke", ""] {
            let response =
                router.clone().oneshot(request("/api/plot", Some(token), body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{token}");
        }

        let mut disabled = state;
        let mut config = (*disabled.jobs.config).clone();
        config.server.api_token = None;
        disabled.jobs.config = Arc::new(config);
        let response = build_router()
            .with_state(disabled)
            .oneshot(request("/api/plot", Some("api-token"), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        assert!(scheduler.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failures() {
        let (state, _, scheduler) = state(source_control(), FakeScheduler::default());
        let router = build_router().with_state(state);
        let body = r#"{"repo":"acme/infra","ref":"main","dir":"infra","workspace":"qa"}"#;
        let response =
            router.clone().oneshot(request("/api/plot", Some("api-token"), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_string(response).await.contains("project infra not found"));

        let response =
            router.oneshot(request("/api/plot", Some("api-token"), r#"{"dir":"infra"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(scheduler.jobs().is_empty());
    }
}
