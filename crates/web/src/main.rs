mod handlers;

use std::{
    fs::File,
    io::BufReader,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    Router,
    extract::{ConnectInfo, FromRef},
    http::{Request, StatusCode, header},
};
use tokio::{net::TcpListener, signal};
use tokio_util::task::TaskTracker;
use tower::ServiceBuilder;
use tower_http::{
    ServiceBuilderExt,
    normalize_path::NormalizePathLayer,
    timeout::TimeoutLayer,
    trace::{DefaultOnResponse, MakeSpan, TraceLayer},
};
use tracing::{Level, Span};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};
use turnip_core::config::Config;
use turnip_github::GitHub;
use turnip_jobs::{JobContext, ReportService};

use crate::handlers::{build_router, build_rpc_router, drain_events};

#[derive(Clone, FromRef)]
pub struct AppState {
    config: Arc<Config>,
    jobs: JobContext,
    reports: ReportService,
    /// Webhook events still being processed.
    tasks: TaskTracker,
}

impl AppState {
    pub fn new(jobs: JobContext) -> Self {
        Self {
            config: jobs.config.clone(),
            reports: jobs.report_service(),
            jobs,
            tasks: TaskTracker::new(),
        }
    }
}

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    let config: Arc<Config> = {
        let path = std::env::var("TURNIP_CONFIG").unwrap_or_else(|_| "config.yml".to_string());
        let file = BufReader::new(File::open(&path).expect("Failed to open config file"));
        serde_yaml::from_reader(file).expect("Failed to parse config file")
    };
    let github = GitHub::new(&config.github).await.expect("Failed to create GitHub client");
    let jobs = JobContext::new(config.clone(), github).expect("Failed to create job scheduler");
    let state = AppState::new(jobs);
    let tasks = state.tasks.clone();

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.server.port));
    tracing::info!("Web server: Listening on {}", addr);
    let listener = TcpListener::bind(addr).await.expect("bind error");
    let rpc_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.server.rpc_port));
    tracing::info!("Report server: Listening on {}", rpc_addr);
    let rpc_listener = TcpListener::bind(rpc_addr).await.expect("bind error");

    let router = app(build_router().with_state(state.clone()))
        .into_make_service_with_connect_info::<SocketAddr>();
    let rpc_router = app(build_rpc_router().with_state(state))
        .into_make_service_with_connect_info::<SocketAddr>();

    // Run both servers concurrently, with graceful shutdown
    let web_server = async {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Web server error");
        tracing::info!("Web server stopped");
        result
    };
    let rpc_server = async {
        let result = axum::serve(rpc_listener, rpc_router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Report server error");
        tracing::info!("Report server stopped");
        result
    };
    if let Err(e) = tokio::try_join!(web_server, rpc_server) {
        tracing::error!("{e}");
    }
    drain_events(&tasks).await;
    tracing::info!("Shut down gracefully");
}

fn app(router: Router) -> Router {
    let sensitive_headers: Arc<[_]> = vec![header::AUTHORIZATION].into();
    let middleware = ServiceBuilder::new()
        .sensitive_request_headers(sensitive_headers.clone())
        .sensitive_response_headers(sensitive_headers)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(RequestSpan { level: Level::INFO })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(120),
        ))
        .layer(NormalizePathLayer::trim_trailing_slash())
        .compression();
    router.layer(middleware)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        tokio::select! {
            _ = signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}

#[derive(Debug, Clone)]
pub struct RequestSpan {
    level: Level,
}

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let forwarded_for = request
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        let ip = forwarded_for
            .or_else(|| {
                request.extensions().get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(a)| a.ip())
            })
            .unwrap_or(IpAddr::from([0, 0, 0, 0]));
        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("[unknown]");
        macro_rules! make_span {
            ($level:expr) => {
                tracing::span!(
                    $level,
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    ip = %ip,
                    user_agent = %user_agent,
                )
            }
        }
        match self.level {
            Level::ERROR => make_span!(Level::ERROR),
            Level::WARN => make_span!(Level::WARN),
            Level::INFO => make_span!(Level::INFO),
            Level::DEBUG => make_span!(Level::DEBUG),
            Level::TRACE => make_span!(Level::TRACE),
        }
    }
}
