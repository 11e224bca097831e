//! Asynchronous analysis jobs and their status machines.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{JobId, StreamId};
use crate::segment::VideoSegment;

/// Local lifecycle of an analysis job as tracked in the archive database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Valid transitions: pending -> processing -> completed/failed, plus
    /// pending -> failed for jobs the runner rejects outright.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

/// Status reported by the external job runner, in its own vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunnerStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl RunnerStatus {
    /// Parse a runner status string ("PENDING", "EXECUTING", ...). Unknown
    /// statuses map to `None` so new runner states degrade to "not ready"
    /// instead of failing the poll.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RunnerStatus::Pending),
            "EXECUTING" => Some(RunnerStatus::Executing),
            "COMPLETED" => Some(RunnerStatus::Completed),
            "FAILED" => Some(RunnerStatus::Failed),
            _ => None,
        }
    }

    /// Map the runner's vocabulary onto the local job lifecycle.
    pub fn to_job_status(self) -> JobStatus {
        match self {
            RunnerStatus::Pending => JobStatus::Pending,
            RunnerStatus::Executing => JobStatus::Processing,
            RunnerStatus::Completed => JobStatus::Completed,
            RunnerStatus::Failed => JobStatus::Failed,
        }
    }
}

/// A persisted analysis job row for the asynchronous extraction path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    /// Runner-assigned identifier, also the primary key locally.
    pub id: JobId,
    pub stream_id: StreamId,
    pub segment: VideoSegment,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Hands persisted from this job's results, populated on reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_hands: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn test_runner_status_parse() {
        assert_eq!(RunnerStatus::parse("EXECUTING"), Some(RunnerStatus::Executing));
        assert_eq!(RunnerStatus::parse("WAITING_FOR_DEPLOY"), None);
    }

    #[test]
    fn test_runner_status_maps_to_local() {
        assert_eq!(RunnerStatus::Executing.to_job_status(), JobStatus::Processing);
        assert_eq!(RunnerStatus::Failed.to_job_status(), JobStatus::Failed);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(
            serde_json::to_string(&RunnerStatus::Executing).unwrap(),
            "\"EXECUTING\""
        );
    }
}
