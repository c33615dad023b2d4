//! HTTP control API: start a scan, poll its status, fetch the report.
//!
//! One scan runs at a time per process. All run state sits behind a single
//! mutex in [`AppState`]; the engine itself stays stateless.

use std::{net::IpAddr, sync::Arc};

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    config::ScanConfig,
    error::ScanError,
    ports::{parse_port_spec, PortSet},
    scanner::{self, ProgressSnapshot, SharedProgress},
    targets::parse_targets,
    types::ScanResult,
};

#[derive(Clone, Default)]
pub struct AppState {
    inner: Arc<Mutex<ServerState>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Default)]
struct ServerState {
    run: RunState,
    progress: SharedProgress,
}

#[derive(Default)]
enum RunState {
    #[default]
    Idle,
    Running {
        started_at: OffsetDateTime,
        cancel: CancellationToken,
    },
    Completed {
        started_at: OffsetDateTime,
        finished_at: OffsetDateTime,
        result: Arc<ScanResult>,
    },
    Failed {
        started_at: OffsetDateTime,
        finished_at: OffsetDateTime,
        error: String,
    },
}

impl RunState {
    fn label(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running { .. } => "running",
            RunState::Completed { .. } => "completed",
            RunState::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub state: &'static str,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub hosts: usize,
    #[serde(flatten)]
    pub progress: ProgressSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default, alias = "cidr", alias = "range")]
    pub target: Option<String>,
    #[serde(default = "default_port_spec")]
    pub ports: String,
    #[serde(flatten)]
    pub config: ScanConfig,
}

fn default_port_spec() -> String {
    "1-1024".into()
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/scan", post(post_scan))
        .route("/status", get(get_status))
        .route("/report", get(get_report))
        .route("/cancel", post(post_cancel))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

pub async fn spawn_server(bind: &str) -> Result<()> {
    let app = router(AppState::new());
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "control API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn rfc3339(t: OffsetDateTime) -> String {
    t.format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

fn error_response(status: StatusCode, msg: impl ToString) -> Response {
    (status, Json(json!({ "error": msg.to_string() }))).into_response()
}

async fn get_status(State(app): State<AppState>) -> Json<StatusResponse> {
    let s = app.inner.lock().await;
    let mut out = StatusResponse {
        state: s.run.label(),
        running: matches!(s.run, RunState::Running { .. }),
        started_at: None,
        finished_at: None,
        last_error: None,
        hosts: 0,
        progress: s.progress.snapshot(),
    };
    match &s.run {
        RunState::Idle => {}
        RunState::Running { started_at, .. } => out.started_at = Some(rfc3339(*started_at)),
        RunState::Completed {
            started_at,
            finished_at,
            result,
        } => {
            out.started_at = Some(rfc3339(*started_at));
            out.finished_at = Some(rfc3339(*finished_at));
            out.hosts = result.len();
        }
        RunState::Failed {
            started_at,
            finished_at,
            error,
        } => {
            out.started_at = Some(rfc3339(*started_at));
            out.finished_at = Some(rfc3339(*finished_at));
            out.last_error = Some(error.clone());
        }
    }
    Json(out)
}

async fn get_report(State(app): State<AppState>) -> Response {
    let s = app.inner.lock().await;
    match &s.run {
        RunState::Completed { result, .. } => Json(result.as_ref().clone()).into_response(),
        _ => Json(ScanResult::new()).into_response(),
    }
}

async fn post_cancel(State(app): State<AppState>) -> Response {
    let s = app.inner.lock().await;
    match &s.run {
        RunState::Running { cancel, .. } => {
            cancel.cancel();
            info!("scan cancellation requested");
            (StatusCode::ACCEPTED, Json(json!({ "status": "cancelling" }))).into_response()
        }
        _ => error_response(StatusCode::CONFLICT, "no scan running"),
    }
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanRequest>) -> Response {
    let ScanRequest {
        mut targets,
        target,
        ports,
        config,
    } = req;
    targets.extend(target);

    // Bad input is rejected before any state change.
    let addrs = match parse_targets(&targets) {
        Ok(a) => a,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let ports = match parse_port_spec(&ports) {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let config = match config.validate() {
        Ok(c) => c,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let cancel = CancellationToken::new();
    let progress = SharedProgress::new();
    let started_at = OffsetDateTime::now_utc();
    {
        let mut s = app.inner.lock().await;
        if matches!(s.run, RunState::Running { .. }) {
            return error_response(StatusCode::CONFLICT, "scan already running");
        }
        s.run = RunState::Running {
            started_at,
            cancel: cancel.clone(),
        };
        s.progress = progress.clone();
    }

    info!(hosts = addrs.len(), ports = ports.len(), "API scan accepted");
    tokio::spawn(run_scan(app, addrs, ports, config, cancel, progress, started_at));

    (StatusCode::ACCEPTED, Json(json!({ "status": "started" }))).into_response()
}

async fn run_scan(
    app: AppState,
    addrs: Vec<IpAddr>,
    ports: PortSet,
    config: ScanConfig,
    cancel: CancellationToken,
    progress: SharedProgress,
    started_at: OffsetDateTime,
) {
    let res = scanner::scan_targets_with_cancel(&addrs, &ports, config, cancel, progress).await;
    let finished_at = OffsetDateTime::now_utc();

    let mut s = app.inner.lock().await;
    s.run = match res {
        Ok(result) => RunState::Completed {
            started_at,
            finished_at,
            result: Arc::new(result),
        },
        Err(e) => {
            if !matches!(e, ScanError::Cancelled) {
                warn!(error = %e, "API scan failed");
            }
            RunState::Failed {
                started_at,
                finished_at,
                error: e.to_string(),
            }
        }
    };
}
