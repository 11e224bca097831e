//! Pipeline progress events.
//!
//! One event stream covers both the synchronous analysis path and the
//! asynchronous extraction path. Events are delivered to clients over SSE,
//! where the variant name becomes the `event:` field and the payload struct
//! the `data:` field.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::HandId;

/// Payload of the `start` event, sent once before any work begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartData {
    /// Identifier of the stream segment being processed, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<String>,
    /// Segment length in seconds.
    pub duration: f64,
    /// Rough wall-clock estimate for the whole run ("60 seconds").
    pub estimated_time: String,
}

/// Payload of a `progress` event within a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressData {
    pub step: u32,
    /// Total number of steps the run will report.
    pub total: u32,
    pub message: String,
}

/// Payload of a `step_complete` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepData {
    pub step: u32,
    pub message: String,
}

/// Payload of a `hand` event, sent after each hand is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HandData {
    pub hand_id: HandId,
    pub hand_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Payload of the terminal `complete` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteData {
    pub total_hands: u32,
    pub saved_hands: u32,
    /// Fraction of detected hands that persisted, 0.0-1.0.
    pub success_rate: f64,
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_confidence: Option<f64>,
    /// Extraction-path extras, absent on the synchronous path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_accuracy: Option<f64>,
}

/// Payload of the terminal `error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    pub message: String,
    /// Step that was running when the failure happened, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
}

/// A progress event emitted by a pipeline run.
///
/// Exactly one terminal event (`complete` or `error`) ends every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PipelineEvent {
    Start(StartData),
    Progress(ProgressData),
    StepComplete(StepData),
    Hand(HandData),
    Complete(CompleteData),
    Error(ErrorData),
}

impl PipelineEvent {
    pub fn start(
        segment_id: Option<String>,
        duration: f64,
        estimated_time: impl Into<String>,
    ) -> Self {
        PipelineEvent::Start(StartData {
            segment_id,
            duration,
            estimated_time: estimated_time.into(),
        })
    }

    pub fn progress(step: u32, total: u32, message: impl Into<String>) -> Self {
        PipelineEvent::Progress(ProgressData {
            step,
            total,
            message: message.into(),
        })
    }

    pub fn step_complete(step: u32, message: impl Into<String>) -> Self {
        PipelineEvent::StepComplete(StepData {
            step,
            message: message.into(),
        })
    }

    pub fn hand(hand_id: HandId, hand_number: impl Into<String>, confidence: Option<f64>) -> Self {
        PipelineEvent::Hand(HandData {
            hand_id,
            hand_number: hand_number.into(),
            confidence,
        })
    }

    pub fn error(message: impl Into<String>, step: Option<u32>) -> Self {
        PipelineEvent::Error(ErrorData {
            message: message.into(),
            step,
        })
    }

    /// SSE `event:` field name.
    pub fn event_name(&self) -> &'static str {
        match self {
            PipelineEvent::Start(_) => "start",
            PipelineEvent::Progress(_) => "progress",
            PipelineEvent::StepComplete(_) => "step_complete",
            PipelineEvent::Hand(_) => "hand",
            PipelineEvent::Complete(_) => "complete",
            PipelineEvent::Error(_) => "error",
        }
    }

    /// JSON payload for the SSE `data:` field.
    pub fn data_json(&self) -> String {
        let json = match self {
            PipelineEvent::Start(d) => serde_json::to_string(d),
            PipelineEvent::Progress(d) => serde_json::to_string(d),
            PipelineEvent::StepComplete(d) => serde_json::to_string(d),
            PipelineEvent::Hand(d) => serde_json::to_string(d),
            PipelineEvent::Complete(d) => serde_json::to_string(d),
            PipelineEvent::Error(d) => serde_json::to_string(d),
        };
        // Payload structs contain no non-serializable types
        json.unwrap_or_else(|_| "{}".to_string())
    }

    /// Render as a complete SSE frame.
    pub fn sse_frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event_name(), self.data_json())
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::Complete(_) | PipelineEvent::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(
            PipelineEvent::start(None, 120.0, "60 seconds").event_name(),
            "start"
        );
        assert_eq!(
            PipelineEvent::step_complete(2, "done").event_name(),
            "step_complete"
        );
    }

    #[test]
    fn test_terminal_events() {
        assert!(PipelineEvent::error("boom", Some(3)).is_terminal());
        assert!(!PipelineEvent::progress(1, 5, "working").is_terminal());
    }

    #[test]
    fn test_start_payload_shape() {
        let event = PipelineEvent::start(Some("stream-1".to_string()), 120.0, "60 seconds");
        assert_eq!(
            event.data_json(),
            r#"{"segmentId":"stream-1","duration":120.0,"estimatedTime":"60 seconds"}"#
        );
        // segmentId is omitted, not null, when unknown
        let anonymous = PipelineEvent::start(None, 120.0, "60 seconds");
        assert_eq!(
            anonymous.data_json(),
            r#"{"duration":120.0,"estimatedTime":"60 seconds"}"#
        );
    }

    #[test]
    fn test_progress_payload_shape() {
        let event = PipelineEvent::progress(2, 6, "Sampling frames");
        assert_eq!(
            event.data_json(),
            r#"{"step":2,"total":6,"message":"Sampling frames"}"#
        );
    }

    #[test]
    fn test_sse_frame_shape() {
        let frame = PipelineEvent::progress(2, 6, "Extracting frames").sse_frame();
        assert!(frame.starts_with("event: progress\ndata: {"));
        assert!(frame.ends_with("\n\n"));
    }

    #[test]
    fn test_complete_omits_absent_extras() {
        let data = CompleteData {
            total_hands: 3,
            saved_hands: 2,
            success_rate: 2.0 / 3.0,
            processing_time_ms: 1200,
            average_confidence: Some(0.9),
            batch_id: None,
            frame_count: None,
            ocr_accuracy: None,
        };
        let json = serde_json::to_string(&data).unwrap();
        assert!(!json.contains("batchId"));
        assert!(json.contains("averageConfidence"));
    }
}
