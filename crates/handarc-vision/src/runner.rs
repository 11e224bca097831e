//! External job runner client.
//!
//! Long extraction runs are executed by an external job runner rather than
//! in-process. This client triggers runs and polls their status; the
//! runner's status vocabulary is mapped to the local job lifecycle by
//! [`handarc_models::RunnerStatus`].

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use handarc_models::{JobId, RunnerStatus};

use crate::error::{VisionError, VisionResult};

/// A run submission for the external runner.
#[derive(Debug, Clone, Serialize)]
pub struct RunnerSubmission {
    /// Task identifier registered with the runner.
    pub task: String,
    /// Task payload, passed through opaquely.
    pub payload: Value,
}

/// A run as reported by the runner.
#[derive(Debug, Clone)]
pub struct RunnerRun {
    pub id: JobId,
    pub status: RunnerStatus,
    /// Task output once the run completed.
    pub output: Option<Value>,
    pub error: Option<String>,
}

/// Triggers and polls runs on the external job runner.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn submit(&self, submission: RunnerSubmission) -> VisionResult<JobId>;

    async fn run(&self, id: &JobId) -> VisionResult<RunnerRun>;
}

#[derive(Debug, Deserialize)]
struct TriggerResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the runner's REST API.
pub struct HttpJobRunner {
    base_url: String,
    token: String,
    client: Client,
}

impl HttpJobRunner {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            client: Client::new(),
        }
    }

    async fn check(&self, response: reqwest::Response) -> VisionResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(VisionError::api(status.as_u16(), message))
    }
}

#[async_trait]
impl JobRunner for HttpJobRunner {
    async fn submit(&self, submission: RunnerSubmission) -> VisionResult<JobId> {
        debug!("Triggering runner task {}", submission.task);
        let response = self
            .client
            .post(format!(
                "{}/tasks/{}/trigger",
                self.base_url, submission.task
            ))
            .bearer_auth(&self.token)
            .json(&submission.payload)
            .send()
            .await?;
        let response = self.check(response).await?;

        let trigger: TriggerResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Parse(format!("malformed trigger response: {}", e)))?;
        info!("Runner accepted job {}", trigger.id);
        Ok(JobId::from_string(trigger.id))
    }

    async fn run(&self, id: &JobId) -> VisionResult<RunnerRun> {
        let response = self
            .client
            .get(format!("{}/runs/{}", self.base_url, id))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let response = self.check(response).await?;

        let run: RunResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Parse(format!("malformed run response: {}", e)))?;

        // Unknown runner states degrade to PENDING so new states added on
        // the runner side read as "not ready" instead of failing the poll
        let status = RunnerStatus::parse(&run.status).unwrap_or(RunnerStatus::Pending);

        Ok(RunnerRun {
            id: JobId::from_string(run.id),
            status,
            output: run.output,
            error: run.error,
        })
    }
}
