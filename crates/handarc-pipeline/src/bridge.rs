//! Bridge to the external job runner.
//!
//! Long segments run on the external runner rather than in-process. This
//! module submits runs, mirrors their status into local job rows, and
//! reconciles finished runs by collecting the vision batch results and
//! persisting the hands.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use handarc_db::{HandSaver, SaveReport};
use handarc_models::{
    AnalysisJob, JobId, JobStatus, RegionMap, RunnerStatus, StreamId, StreamStatus, VideoSegment,
    MAX_BATCH_SEGMENT_SECS,
};
use handarc_vision::{BatchState, RunnerSubmission};

use crate::deps::PipelineDeps;
use crate::error::{PipelineError, PipelineResult};

/// Runner task that executes the extraction pipeline.
const EXTRACT_TASK: &str = "extract-hands";

/// A request to run extraction on the external runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    pub stream_id: StreamId,
    pub url: String,
    pub segment: VideoSegment,
    pub regions: RegionMap,
}

/// Outcome of one reconciliation attempt.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// The runner or the vision batch is still working.
    NotReady,
    /// Results were collected and persisted.
    Completed(SaveReport),
    /// The run failed; the job and stream were marked accordingly.
    Failed(String),
}

/// Submit an extraction run to the external runner and record the job.
pub async fn submit_job(
    deps: &PipelineDeps,
    request: SubmitJobRequest,
) -> PipelineResult<AnalysisJob> {
    validate_url(&request.url)?;
    request.segment.validate(MAX_BATCH_SEGMENT_SECS)?;
    request.regions.validate()?;

    deps.store
        .ensure_stream(&request.stream_id, &request.url)
        .await?;

    let payload = serde_json::to_value(&request)
        .map_err(|e| PipelineError::invalid_input(format!("unserializable payload: {}", e)))?;

    let id = deps
        .runner
        .submit(RunnerSubmission {
            task: EXTRACT_TASK.to_string(),
            payload,
        })
        .await?;

    let now = Utc::now();
    let job = AnalysisJob {
        id,
        stream_id: request.stream_id,
        segment: request.segment,
        status: JobStatus::Pending,
        error: None,
        saved_hands: None,
        created_at: now,
        updated_at: now,
    };
    deps.store.insert_job(&job).await?;

    info!(
        "Submitted extraction job {} for stream {} ({}s segment)",
        job.id,
        job.stream_id,
        job.segment.duration_secs()
    );
    Ok(job)
}

/// Poll the runner for a job's current status and mirror it locally.
pub async fn poll_job(deps: &PipelineDeps, id: &JobId) -> PipelineResult<AnalysisJob> {
    let mut job = require_job(deps, id).await?;
    if job.status.is_terminal() {
        return Ok(job);
    }

    let run = deps.runner.run(id).await?;
    let next = run.status.to_job_status();
    if next != job.status && job.status.can_transition_to(next) {
        let error = run.error.as_deref();
        deps.store.update_job(id, next, error, None).await?;
        job.status = next;
        job.error = run.error;
        job.updated_at = Utc::now();
    }
    Ok(job)
}

/// Collect results for a finished run: read the batch output, persist the
/// hands, and close out the job and stream rows. Safe to call repeatedly
/// while the run is still in flight.
pub async fn reconcile_job(deps: &PipelineDeps, id: &JobId) -> PipelineResult<ReconcileOutcome> {
    let job = require_job(deps, id).await?;
    if job.status.is_terminal() {
        return Err(PipelineError::invalid_input(format!(
            "job {} is already {}",
            id,
            job.status.as_str()
        )));
    }

    let run = deps.runner.run(id).await?;
    match run.status {
        RunnerStatus::Pending => Ok(ReconcileOutcome::NotReady),
        RunnerStatus::Executing => {
            if job.status == JobStatus::Pending {
                deps.store
                    .update_job(id, JobStatus::Processing, None, None)
                    .await?;
            }
            Ok(ReconcileOutcome::NotReady)
        }
        RunnerStatus::Failed => {
            let message = run
                .error
                .unwrap_or_else(|| "runner reported failure".to_string());
            fail_job(deps, &job, &message).await?;
            Ok(ReconcileOutcome::Failed(message))
        }
        RunnerStatus::Completed => {
            let Some(batch_id) = run
                .output
                .as_ref()
                .and_then(|o| o.get("batchId"))
                .and_then(|v| v.as_str())
            else {
                let message = "runner completed without a batch id".to_string();
                fail_job(deps, &job, &message).await?;
                return Ok(ReconcileOutcome::Failed(message));
            };
            reconcile_batch(deps, &job, batch_id).await
        }
    }
}

async fn reconcile_batch(
    deps: &PipelineDeps,
    job: &AnalysisJob,
    batch_id: &str,
) -> PipelineResult<ReconcileOutcome> {
    match deps.batch.status(batch_id).await? {
        BatchState::Pending | BatchState::Running => Ok(ReconcileOutcome::NotReady),
        BatchState::Failed(message) => {
            warn!("Batch {} for job {} failed: {}", batch_id, job.id, message);
            fail_job(deps, job, &message).await?;
            Ok(ReconcileOutcome::Failed(message))
        }
        BatchState::Succeeded => {
            let hands = match deps.batch.results(batch_id).await {
                Ok(hands) => hands,
                Err(e) if !e.is_retryable() => {
                    let message = format!("batch {} results unavailable: {}", batch_id, e);
                    warn!("Job {}: {}", job.id, message);
                    fail_job(deps, job, &message).await?;
                    return Ok(ReconcileOutcome::Failed(message));
                }
                // Transient fetch errors leave the job open for the next
                // reconcile attempt
                Err(e) => return Err(e.into()),
            };
            let saver = HandSaver::new(deps.store.clone());
            let report = saver.persist_batch(&job.stream_id, &hands).await;
            info!(
                "Job {} reconciled: {}/{} hands saved from batch {}",
                job.id,
                report.saved_count(),
                report.total,
                batch_id
            );

            if job.status == JobStatus::Pending {
                deps.store
                    .update_job(&job.id, JobStatus::Processing, None, None)
                    .await?;
            }
            deps.store
                .update_job(
                    &job.id,
                    JobStatus::Completed,
                    None,
                    Some(i64::from(report.saved_count())),
                )
                .await?;
            deps.store
                .update_stream_status(&job.stream_id, StreamStatus::Completed)
                .await?;
            Ok(ReconcileOutcome::Completed(report))
        }
    }
}

async fn fail_job(deps: &PipelineDeps, job: &AnalysisJob, message: &str) -> PipelineResult<()> {
    if job.status == JobStatus::Processing || job.status == JobStatus::Pending {
        deps.store
            .update_job(&job.id, JobStatus::Failed, Some(message), None)
            .await?;
    }
    deps.store
        .update_stream_status(&job.stream_id, StreamStatus::Failed)
        .await?;
    Ok(())
}

async fn require_job(deps: &PipelineDeps, id: &JobId) -> PipelineResult<AnalysisJob> {
    deps.store
        .get_job(id)
        .await?
        .ok_or_else(|| PipelineError::invalid_input(format!("unknown job {}", id)))
}

fn validate_url(url: &str) -> PipelineResult<()> {
    if url.starts_with("gs://") || url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(PipelineError::invalid_input(format!(
            "unsupported video url scheme: {}",
            url
        )))
    }
}
