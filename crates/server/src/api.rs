//! Public decision API.
//!
//! Endpoints:
//! - `POST /agents/{agent_id}/query`           — submit a request, returns `{job_id, status}`
//! - `GET  /agents/{agent_id}/query/{job_id}`  — poll a job for its terminal decision
//! - `GET  /agents/{agent_id}/history?limit=N` — prior decisions, newest first

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use cityhall_core::domain::decision::Decision;
use cityhall_core::domain::department::Department;
use cityhall_core::domain::job::{JobId, JobStatus};
use cityhall_core::domain::request::Severity;
use cityhall_core::errors::ApplicationError;
use cityhall_db::repositories::{DecisionRepository, JobRepository};

use crate::orchestrator::{Orchestrator, Submission};

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub jobs: Arc<dyn JobRepository>,
    pub decisions: Arc<dyn DecisionRepository>,
    pub history_default_limit: u32,
    pub history_max_limit: u32,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/agents/{agent_id}/query", post(submit_query))
        .route("/agents/{agent_id}/query/{job_id}", get(poll_query))
        .route("/agents/{agent_id}/history", get(history))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub from: Option<String>,
    pub location: String,
    pub reason: String,
    pub severity: Option<String>,
    pub estimated_cost: Option<Decimal>,
    pub window_start: Option<DateTime<Utc>>,
    pub duration_hours: Option<i64>,
    #[serde(default)]
    pub has_permit: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub decisions: Vec<Decision>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError { error: message.into() }))
}

fn parse_agent(agent_id: &str) -> Result<Department, (StatusCode, Json<ApiError>)> {
    Department::parse(agent_id).ok_or_else(|| {
        error_response(StatusCode::NOT_FOUND, format!("unknown agent `{agent_id}`"))
    })
}

pub async fn submit_query(
    State(state): State<ApiState>,
    Path(agent_id): Path<String>,
    body: Result<Json<SubmitBody>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), (StatusCode, Json<ApiError>)> {
    let department = parse_agent(&agent_id)?;

    let Json(body) = body.map_err(|rejection| {
        error_response(StatusCode::BAD_REQUEST, format!("invalid request body: {rejection}"))
    })?;

    let severity = body
        .severity
        .as_deref()
        .map(|raw| {
            Severity::parse(raw).ok_or_else(|| {
                error_response(StatusCode::BAD_REQUEST, format!("unknown severity `{raw}`"))
            })
        })
        .transpose()?;

    info!(
        event_name = "api.query.received",
        department = %department,
        kind = %body.kind,
        from = body.from.as_deref().unwrap_or("anonymous"),
        "query submission received"
    );

    let submission = Submission {
        kind: body.kind,
        reason: body.reason,
        location: body.location,
        severity,
        estimated_cost: body.estimated_cost,
        window_start: body.window_start,
        duration_hours: body.duration_hours,
        has_permit: body.has_permit,
    };

    match state.orchestrator.submit(department, submission).await {
        Ok(job) => Ok((
            StatusCode::ACCEPTED,
            Json(SubmitResponse { job_id: job.id.0, status: "queued" }),
        )),
        Err(ApplicationError::InvalidRequest(message)) => {
            Err(error_response(StatusCode::BAD_REQUEST, message))
        }
        Err(other) => Err(error_response(StatusCode::SERVICE_UNAVAILABLE, other.to_string())),
    }
}

pub async fn poll_query(
    State(state): State<ApiState>,
    Path((agent_id, job_id)): Path<(String, String)>,
) -> Result<Json<PollResponse>, (StatusCode, Json<ApiError>)> {
    let department = parse_agent(&agent_id)?;

    let job = state
        .jobs
        .find_job_by_id(&JobId(job_id.clone()))
        .await
        .map_err(|error| error_response(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?
        .filter(|job| job.department == department)
        .ok_or_else(|| {
            error_response(StatusCode::NOT_FOUND, format!("unknown job `{job_id}`"))
        })?;

    let response = match job.status {
        JobStatus::Queued => PollResponse { status: "queued", result: None, error: None },
        JobStatus::Running => PollResponse { status: "running", result: None, error: None },
        JobStatus::Succeeded => {
            let decision = state
                .decisions
                .find_by_job_id(&job.id)
                .await
                .map_err(|error| {
                    error_response(StatusCode::SERVICE_UNAVAILABLE, error.to_string())
                })?
                .ok_or_else(|| {
                    error_response(
                        StatusCode::SERVICE_UNAVAILABLE,
                        format!("decision missing for succeeded job `{job_id}`"),
                    )
                })?;
            PollResponse { status: "succeeded", result: Some(decision), error: None }
        }
        JobStatus::Failed => PollResponse {
            status: "failed",
            result: None,
            error: Some(job.error.unwrap_or_else(|| "job failed".to_string())),
        },
    };

    Ok(Json(response))
}

pub async fn history(
    State(state): State<ApiState>,
    Path(agent_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, (StatusCode, Json<ApiError>)> {
    let department = parse_agent(&agent_id)?;

    let limit = query
        .limit
        .unwrap_or(state.history_default_limit)
        .clamp(1, state.history_max_limit);

    let decisions = state
        .decisions
        .list_recent(department, limit)
        .await
        .map_err(|error| error_response(StatusCode::SERVICE_UNAVAILABLE, error.to_string()))?;

    Ok(Json(HistoryResponse { decisions }))
}
