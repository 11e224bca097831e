//! Analysis job handlers for the asynchronous extraction path.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use handarc_models::{AnalysisJob, JobId};
use handarc_pipeline::{poll_job, reconcile_job, submit_job, ReconcileOutcome, SubmitJobRequest};

use crate::error::ApiResult;
use crate::state::AppState;

/// Submit an extraction run to the external runner.
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> ApiResult<Json<AnalysisJob>> {
    let job = submit_job(&state.deps, request).await?;
    Ok(Json(job))
}

/// Poll a job, mirroring the runner's status into the local row.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AnalysisJob>> {
    let job = poll_job(&state.deps, &JobId::from_string(id)).await?;
    Ok(Json(job))
}

/// Reconciliation result as reported to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_hands: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_hands: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Collect a finished run's batch results and persist the hands.
pub async fn reconcile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ReconcileResponse>> {
    let outcome = reconcile_job(&state.deps, &JobId::from_string(id)).await?;
    let response = match outcome {
        ReconcileOutcome::NotReady => ReconcileResponse {
            status: "not_ready",
            total_hands: None,
            saved_hands: None,
            skipped: None,
            failed: None,
            error: None,
        },
        ReconcileOutcome::Completed(report) => ReconcileResponse {
            status: "completed",
            total_hands: Some(report.total),
            saved_hands: Some(report.saved_count()),
            skipped: Some(report.skipped),
            failed: Some(report.failed),
            error: None,
        },
        ReconcileOutcome::Failed(message) => ReconcileResponse {
            status: "failed",
            total_hands: None,
            saved_hands: None,
            skipped: None,
            failed: None,
            error: Some(message),
        },
    };
    Ok(Json(response))
}
