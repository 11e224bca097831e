//! Batch submission for long segments.
//!
//! Long segments produce too many frames for one synchronous request, so
//! frames are packed into fixed-size batch requests, serialized as JSONL
//! and submitted to the provider's batch API. Results are fetched later by
//! the reconciliation path.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use handarc_media::FrameReading;
use handarc_models::CandidateHand;

use crate::analyzer::{parse_candidate_hands, FramePayload};
use crate::error::{VisionError, VisionResult};

/// Frames per batch request. Enough context for the model to see whole
/// hands (a ~36s window at the 2s sampling interval) while staying under
/// per-request payload limits.
pub const FRAMES_PER_REQUEST: usize = 18;

/// Approximate vision tokens consumed per frame at 720p.
const TOKENS_PER_FRAME: f64 = 258.0;
/// Batch-tier price per million input tokens, USD.
const PRICE_PER_MILLION_TOKENS: f64 = 0.075;

/// One request line of a batch submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    /// Stable key correlating this request with its result line.
    pub custom_id: String,
    /// Offset of the first frame within the source video, seconds.
    pub window_start_secs: f64,
    /// Base64 JPEG frames in chronological order.
    pub frames: Vec<String>,
    /// OCR readings for the frames in this window.
    pub readings: Vec<FrameReading>,
}

impl BatchRequest {
    /// Pack frames and their readings into batch requests of
    /// [`FRAMES_PER_REQUEST`] frames each.
    pub fn pack(frames: &[FramePayload], readings: &[FrameReading]) -> Vec<BatchRequest> {
        frames
            .chunks(FRAMES_PER_REQUEST)
            .enumerate()
            .map(|(i, chunk)| {
                let first = chunk.first().map(|f| f.index).unwrap_or(0);
                BatchRequest {
                    custom_id: format!("window-{:04}", i),
                    window_start_secs: chunk.first().map(|f| f.offset_secs).unwrap_or(0.0),
                    frames: chunk
                        .iter()
                        .map(|f| base64::engine::general_purpose::STANDARD.encode(&f.jpeg))
                        .collect(),
                    readings: readings
                        .iter()
                        .filter(|r| r.frame_index >= first && r.frame_index < first + chunk.len())
                        .cloned()
                        .collect(),
                }
            })
            .collect()
    }
}

/// Serialize batch requests as JSONL, one request per line.
pub fn to_jsonl(requests: &[BatchRequest]) -> VisionResult<String> {
    let mut out = String::new();
    for request in requests {
        out.push_str(&serde_json::to_string(request)?);
        out.push('\n');
    }
    Ok(out)
}

/// Provider-side state of a submitted batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchState {
    Pending,
    Running,
    Succeeded,
    Failed(String),
}

/// Submits frame batches and fetches their results.
#[async_trait]
pub trait BatchSubmitter: Send + Sync {
    /// Submit a batch; returns the provider-assigned batch id.
    async fn submit(&self, requests: &[BatchRequest]) -> VisionResult<String>;

    async fn status(&self, batch_id: &str) -> VisionResult<BatchState>;

    /// Fetch candidate hands from a succeeded batch.
    async fn results(&self, batch_id: &str) -> VisionResult<Vec<CandidateHand>>;
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    state: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultLine {
    #[allow(dead_code)]
    custom_id: String,
    response: String,
}

/// Batch submitter backed by the provider's HTTP batch API.
pub struct VisionBatchClient {
    api_key: String,
    base_url: String,
    client: Client,
}

impl VisionBatchClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
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
impl BatchSubmitter for VisionBatchClient {
    async fn submit(&self, requests: &[BatchRequest]) -> VisionResult<String> {
        let jsonl = to_jsonl(requests)?;
        debug!(
            "Submitting batch of {} requests ({} bytes)",
            requests.len(),
            jsonl.len()
        );

        let response = self
            .client
            .post(format!("{}/batches", self.base_url))
            .bearer_auth(&self.api_key)
            .header("content-type", "application/jsonl")
            .body(jsonl)
            .send()
            .await?;
        let response = self.check(response).await?;

        let submit: SubmitResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Parse(format!("malformed submit response: {}", e)))?;
        info!("Batch {} submitted", submit.id);
        Ok(submit.id)
    }

    async fn status(&self, batch_id: &str) -> VisionResult<BatchState> {
        let response = self
            .client
            .get(format!("{}/batches/{}", self.base_url, batch_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let response = self.check(response).await?;

        let status: StatusResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Parse(format!("malformed status response: {}", e)))?;

        Ok(match status.state.as_str() {
            "pending" => BatchState::Pending,
            "running" => BatchState::Running,
            "succeeded" => BatchState::Succeeded,
            "failed" => BatchState::Failed(status.error.unwrap_or_default()),
            // Unknown states degrade to "still running" rather than failing
            other => {
                debug!("Unknown batch state '{}', treating as running", other);
                BatchState::Running
            }
        })
    }

    async fn results(&self, batch_id: &str) -> VisionResult<Vec<CandidateHand>> {
        let response = self
            .client
            .get(format!("{}/batches/{}/results", self.base_url, batch_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let response = self.check(response).await?;

        let body = response.text().await?;
        let mut hands = Vec::new();
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            let result: ResultLine = serde_json::from_str(line)
                .map_err(|e| VisionError::Parse(format!("malformed result line: {}", e)))?;
            hands.extend(parse_candidate_hands(&result.response)?);
        }
        Ok(hands)
    }
}

/// Estimated batch-tier cost in USD for analyzing the given frame count.
pub fn estimate_batch_cost(frame_count: usize) -> f64 {
    frame_count as f64 * TOKENS_PER_FRAME / 1_000_000.0 * PRICE_PER_MILLION_TOKENS
}

/// Shape of one result line, used by tests and the in-process fake.
pub fn result_line(custom_id: &str, hands_json: &str) -> String {
    json!({ "custom_id": custom_id, "response": hands_json }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payloads(count: usize) -> Vec<FramePayload> {
        (0..count)
            .map(|i| FramePayload {
                index: i,
                offset_secs: i as f64 * 2.0,
                jpeg: vec![0xff, 0xd8],
            })
            .collect()
    }

    #[test]
    fn test_pack_splits_at_frame_limit() {
        let requests = BatchRequest::pack(&payloads(40), &[]);
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].frames.len(), FRAMES_PER_REQUEST);
        assert_eq!(requests[2].frames.len(), 4);
        assert_eq!(requests[0].custom_id, "window-0000");
        assert!((requests[1].window_start_secs - 36.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pack_aligns_readings_with_windows() {
        let readings: Vec<FrameReading> = (0..20)
            .map(|i| FrameReading {
                frame_index: i,
                ..Default::default()
            })
            .collect();
        let requests = BatchRequest::pack(&payloads(20), &readings);
        assert_eq!(requests[0].readings.len(), 18);
        assert_eq!(requests[1].readings.len(), 2);
        assert_eq!(requests[1].readings[0].frame_index, 18);
    }

    #[test]
    fn test_jsonl_one_line_per_request() {
        let requests = BatchRequest::pack(&payloads(20), &[]);
        let jsonl = to_jsonl(&requests).unwrap();
        assert_eq!(jsonl.lines().count(), 2);
        assert!(jsonl.lines().all(|l| l.starts_with('{')));
    }

    #[test]
    fn test_cost_estimate_scales_with_frames() {
        assert_eq!(estimate_batch_cost(0), 0.0);
        let small = estimate_batch_cost(18);
        let large = estimate_batch_cost(1800);
        assert!(large > small * 99.0 && large < small * 101.0);
    }
}
