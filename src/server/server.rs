use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use super::metrics::metrics_handler;
use super::{log_requests, state::*, RequestsLoggingLevel, ServerConfig};
use crate::background_jobs::{JobError, SchedulerHandle};
use crate::config::{ConfigurationManager, PluginConfiguration};

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 500;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct TriggerResponse {
    job_id: String,
    status: &'static str,
}

#[derive(Deserialize, Debug)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Deserialize, Debug)]
struct AuditQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

impl AuditQuery {
    fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .min(MAX_HISTORY_LIMIT)
    }
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /v1/admin/jobs
async fn list_jobs(State(scheduler): State<SchedulerHandle>) -> Response {
    match scheduler.list_jobs().await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => {
            warn!("Failed to list jobs: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to list jobs")
        }
    }
}

/// GET /v1/admin/jobs/{id}
async fn get_job(State(scheduler): State<SchedulerHandle>, Path(job_id): Path<String>) -> Response {
    match scheduler.get_job(&job_id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("Failed to get job {}: {}", job_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get job")
        }
    }
}

/// GET /v1/admin/jobs/{id}/history?limit=N
async fn get_job_history(
    State(scheduler): State<SchedulerHandle>,
    Path(job_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    if !scheduler.job_exists(&job_id).await {
        return StatusCode::NOT_FOUND.into_response();
    }
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);

    match scheduler.get_job_history(&job_id, limit) {
        Ok(history) => Json(history).into_response(),
        Err(e) => {
            warn!("Failed to get history for job {}: {}", job_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get job history")
        }
    }
}

/// GET /v1/admin/audit?limit=N&offset=M
async fn get_audit_log(
    State(scheduler): State<SchedulerHandle>,
    Query(query): Query<AuditQuery>,
) -> Response {
    match scheduler.get_job_audit_log(query.limit(), query.offset.unwrap_or(0)) {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => {
            warn!("Failed to read job audit log: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read audit log")
        }
    }
}

/// GET /v1/admin/jobs/{id}/audit?limit=N&offset=M
async fn get_job_audit_log(
    State(scheduler): State<SchedulerHandle>,
    Path(job_id): Path<String>,
    Query(query): Query<AuditQuery>,
) -> Response {
    if !scheduler.job_exists(&job_id).await {
        return StatusCode::NOT_FOUND.into_response();
    }
    match scheduler.get_job_audit_log_by_job(&job_id, query.limit(), query.offset.unwrap_or(0)) {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => {
            warn!("Failed to read audit log for job {}: {}", job_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read audit log")
        }
    }
}

/// POST /v1/admin/jobs/{id}/trigger
///
/// The body is optional. When present it must be a JSON value and is handed
/// to the job as its parameters.
async fn trigger_job(
    State(scheduler): State<SchedulerHandle>,
    Path(job_id): Path<String>,
    body: Bytes,
) -> Response {
    let params = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice::<JsonValue>(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", e))
            }
        }
    };

    match scheduler.trigger_job(&job_id, params).await {
        Ok(()) => {
            info!("Job {} triggered via admin API", job_id);
            (
                StatusCode::ACCEPTED,
                Json(TriggerResponse {
                    job_id,
                    status: "triggered",
                }),
            )
                .into_response()
        }
        Err(JobError::NotFound) => StatusCode::NOT_FOUND.into_response(),
        Err(e @ JobError::AlreadyRunning) => error_response(StatusCode::CONFLICT, e),
        Err(e) => {
            warn!("Failed to trigger job {}: {}", job_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// GET /v1/admin/configuration
async fn get_configuration(State(configuration): State<GuardedConfigurationManager>) -> Response {
    match configuration.load() {
        Ok(config) => Json(config).into_response(),
        Err(e) => {
            warn!("Failed to load plugin configuration: {:#}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load configuration",
            )
        }
    }
}

/// PUT /v1/admin/configuration
async fn put_configuration(
    State(configuration): State<GuardedConfigurationManager>,
    Json(body): Json<PluginConfiguration>,
) -> Response {
    match configuration.save(&body) {
        Ok(()) => {
            info!(
                "Plugin configuration updated ({} pinned collections)",
                body.pinned_collection_ids.len()
            );
            Json(body).into_response()
        }
        Err(e) => {
            warn!("Failed to save plugin configuration: {:#}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to save configuration",
            )
        }
    }
}

pub fn make_app(state: ServerState) -> Router {
    let admin_routes: Router = Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/history", get(get_job_history))
        .route("/jobs/{id}/trigger", post(trigger_job))
        .route("/jobs/{id}/audit", get(get_job_audit_log))
        .route("/audit", get(get_audit_log))
        .route(
            "/configuration",
            get(get_configuration).put(put_configuration),
        )
        .with_state(state.clone());

    let home_router: Router = Router::new()
        .route("/", get(home))
        .route("/metrics", get(metrics_handler))
        .with_state(state.clone());

    home_router
        .nest("/v1/admin", admin_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(
    scheduler_handle: SchedulerHandle,
    configuration: ConfigurationManager,
    requests_logging_level: RequestsLoggingLevel,
    port: u16,
) -> Result<()> {
    let state = ServerState {
        config: ServerConfig {
            requests_logging_level,
            port,
        },
        start_time: Instant::now(),
        scheduler_handle,
        configuration: Arc::new(configuration),
    };
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on port {}", port);

    Ok(axum::serve(listener, app).await?)
}
