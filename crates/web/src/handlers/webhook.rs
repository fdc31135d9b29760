use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tokio_util::task::TaskTracker;
use turnip_github::{events::Event, webhook::GitHubEvent};
use turnip_jobs::{JobContext, process_issue_comment, process_pull_request};

/// Acknowledge the delivery and process it in the background.
pub async fn webhook(
    State(jobs): State<JobContext>,
    State(tasks): State<TaskTracker>,
    GitHubEvent { delivery, event }: GitHubEvent,
) -> Response {
    let delivery = delivery.unwrap_or_else(|| "[unknown]".to_string());
    tracing::info!("Received webhook event {} ({delivery})", event.kind());
    match event {
        Event::Ping => (StatusCode::OK, "pong").into_response(),
        Event::Other(_) => (StatusCode::OK, "Event ignored").into_response(),
        event => {
            spawn_event(&tasks, jobs, event, delivery);
            (StatusCode::OK, "Event processed").into_response()
        }
    }
}

fn spawn_event(tasks: &TaskTracker, jobs: JobContext, event: Event, delivery: String) {
    tasks.spawn(async move {
        if let Err(e) = handle_event(&jobs, &event).await {
            tracing::error!("Failed to process {} event {delivery}: {e:?}", event.kind());
        }
    });
}

/// Close the tracker and wait for in-flight events to finish.
pub async fn drain_events(tasks: &TaskTracker) {
    tasks.close();
    if !tasks.is_empty() {
        tracing::info!("Waiting for {} webhook events to finish", tasks.len());
    }
    tasks.wait().await;
}

pub async fn handle_event(jobs: &JobContext, event: &Event) -> Result<()> {
    match event {
        Event::PullRequest(event) => {
            let outcomes = process_pull_request(jobs, event).await?;
            let dispatched = outcomes.iter().filter(|o| o.is_dispatched()).count();
            tracing::info!("Dispatched {dispatched} of {} projects", outcomes.len());
        }
        Event::IssueComment(event) => process_issue_comment(jobs, event).await?,
        Event::Ping | Event::Other(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{body::Body, http::Request};
    use tower::ServiceExt;
    use turnip_jobs::testing::{
        FakeScheduler, FakeSourceControl, SlowSourceControl, repository, slow_context,
    };

    use super::*;
    use crate::handlers::{
        build_router,
        tests::{body_string, state},
    };

    fn delivery(kind: &str, body: &str) -> Request<Body> {
        Request::post("/api/github/webhook")
            .header("X-GitHub-Event", kind)
            .header("X-GitHub-Delivery", "72d3162e")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let (state, _, _) = state(FakeSourceControl::default(), FakeScheduler::default());
        let response =
            build_router().with_state(state).oneshot(delivery("ping", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "pong");
    }

    #[tokio::test]
    async fn test_missing_event_header() {
        let (state, _, _) = state(FakeSourceControl::default(), FakeScheduler::default());
        let request = Request::post("/api/github/webhook").body(Body::from("{}")).unwrap();
        let response = build_router().with_state(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_handle_pull_request_event() {
        let config = "version: v1alpha1\nworkflows:\n  tf: {terraform: {version: 1.7.5}, image: alpine}\nprojects:\n  - {dir: infra, workflow: tf, workspace: staging, autoPlan: true}\n";
        let (state, github, scheduler) = state(
            FakeSourceControl::default()
                .with_file("turnip.yaml", config)
                .with_changes(&["infra/main.tf"]),
            FakeScheduler::default(),
        );
        let event = Event::PullRequest(Box::new(turnip_github::events::PullRequestEvent {
            action: "synchronize".into(),
            number: 7,
            pull_request: turnip_jobs::testing::pull_request(7, "abc123"),
            repository: repository(),
        }));
        handle_event(&state.jobs, &event).await.unwrap();
        assert_eq!(github.statuses().len(), 1);
        assert_eq!(scheduler.jobs()[0].check_name(), Some("turnip/terraform/plan/infra/staging"));
    }

    #[tokio::test]
    async fn test_comment_delivery_runs_in_background() {
        let config = "version: v1alpha1\nworkflows:\n  tf: {terraform: {version: 1.7.5}, image: alpine}\nprojects:\n  - {dir: infra, workflow: tf, workspace: staging}\n";
        let (state, github, scheduler) = state(
            FakeSourceControl {
                pull_request: Some(turnip_jobs::testing::pull_request(7, "abc123")),
                ..Default::default()
            }
            .with_file("turnip.yaml", config)
            .with_changes(&["infra/main.tf"]),
            FakeScheduler::default(),
        );
        let tasks = state.tasks.clone();
        let body = include_str!("../../../github/fixtures/issue_comment.json");
        let response =
            build_router().with_state(state).oneshot(delivery("issue_comment", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "Event processed");

        drain_events(&tasks).await;
        assert_eq!(scheduler.jobs()[0].check_name(), Some("turnip/terraform/plan/infra/staging"));
        assert_eq!(
            github.reactions(),
            vec![(
                "/repos/acme/infra/issues/comments/42/reactions".to_string(),
                turnip_github::Reaction::ThumbsUp
            )]
        );
    }

    #[tokio::test]
    async fn test_drain_waits_for_pending_trigger() {
        let config = "version: v1alpha1\nworkflows:\n  tf: {terraform: {version: 1.7.5}, image: alpine}\nprojects:\n  - {dir: infra, workflow: tf, workspace: staging, autoPlan: true}\n";
        let mut github = SlowSourceControl::default();
        github.inner = FakeSourceControl::default()
            .with_file("turnip.yaml", config)
            .with_changes(&["infra/main.tf"]);
        let (jobs, github, scheduler) = slow_context(github, FakeScheduler::default());
        let event = Event::PullRequest(Box::new(turnip_github::events::PullRequestEvent {
            action: "opened".into(),
            number: 7,
            pull_request: turnip_jobs::testing::pull_request(7, "abc123"),
            repository: repository(),
        }));
        let tasks = TaskTracker::new();
        spawn_event(&tasks, jobs, event, "72d3162e".into());

        let drain = drain_events(&tasks);
        tokio::pin!(drain);
        assert!(tokio::time::timeout(Duration::from_millis(50), &mut drain).await.is_err());
        assert!(scheduler.jobs().is_empty());

        github.release();
        drain.await;
        assert_eq!(scheduler.jobs().len(), 1);
        assert_eq!(github.inner.statuses().len(), 1);
        assert!(tasks.is_empty());
    }
}
