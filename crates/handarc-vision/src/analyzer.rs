//! Synchronous vision analyzer client.
//!
//! Sends sampled frames plus their OCR readings to the vision model and
//! parses the returned candidate hands. Used on the short-segment path
//! where the caller waits for results inline.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use handarc_media::FrameReading;
use handarc_models::CandidateHand;

use crate::error::{VisionError, VisionResult};

/// One frame attached to an analysis request.
#[derive(Debug, Clone)]
pub struct FramePayload {
    pub index: usize,
    /// Offset within the source video, seconds.
    pub offset_secs: f64,
    /// JPEG bytes of the full frame.
    pub jpeg: Vec<u8>,
}

/// Everything the model needs to detect hands in one segment.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub frames: Vec<FramePayload>,
    /// OCR readings aligned with `frames` by index.
    pub readings: Vec<FrameReading>,
}

/// Detects poker hands in a set of frames.
#[async_trait]
pub trait HandAnalyzer: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> VisionResult<Vec<CandidateHand>>;
}

#[derive(Debug, Serialize)]
struct ModelRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct ModelResponse {
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

/// Vision analyzer backed by a generative vision API.
pub struct HttpHandAnalyzer {
    api_key: String,
    base_url: String,
    /// Models tried in order until one succeeds.
    models: Vec<String>,
    client: Client,
}

impl HttpHandAnalyzer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            models: vec![
                "gemini-2.5-flash".to_string(),
                "gemini-2.5-pro".to_string(),
            ],
            client: Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    fn build_prompt(request: &AnalysisRequest) -> String {
        let readings = serde_json::to_string(&request.readings).unwrap_or_else(|_| "[]".into());
        let offsets: Vec<String> = request
            .frames
            .iter()
            .map(|f| format!("frame {} at {:.0}s", f.index, f.offset_secs))
            .collect();

        format!(
            r#"You are analyzing frames from a televised poker broadcast.
Identify every complete poker hand visible across these frames.

Return ONLY a JSON array of hands with this schema:
[
  {{
    "handNumber": "string",
    "stakes": "500/1000",
    "pot": 0,
    "board": {{"flop": ["As","Kh","Qd"], "turn": "7c", "river": "3s"}},
    "players": [{{"name": "...", "position": "BTN", "seat": 1, "holeCards": ["Ah","Ad"], "stackStart": 0, "stackEnd": 0}}],
    "actions": [{{"player": "...", "street": "preflop", "actionType": "raise", "amount": 0}}],
    "winners": [{{"name": "...", "amount": 0, "handDescription": "..."}}],
    "confidence": 0.0,
    "timestampStart": 0,
    "timestampEnd": 0
  }}
]

Frame offsets within the source video: {offsets}.
OCR readings extracted from the frames (names, stacks, board, pot):
{readings}

Rules:
- Card codes use rank + suit letter ("As", "Th", "9c").
- Streets are "preflop", "flop", "turn", "river".
- Action types are "fold", "check", "call", "bet", "raise", "all-in".
- timestampStart/timestampEnd are offsets in seconds within the source video.
- Omit hands you cannot see at least one complete betting round of.
- Return [] if no complete hand is visible."#,
            offsets = offsets.join(", "),
            readings = readings
        )
    }

    async fn call_model(&self, model: &str, request: &AnalysisRequest) -> VisionResult<Vec<CandidateHand>> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let mut parts = vec![Part::Text {
            text: Self::build_prompt(request),
        }];
        for frame in &request.frames {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: "image/jpeg".to_string(),
                    data: base64::engine::general_purpose::STANDARD.encode(&frame.jpeg),
                },
            });
        }

        let body = ModelRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(2000);
            return Err(VisionError::RateLimited { retry_after_ms });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(VisionError::api(status.as_u16(), message));
        }

        let model_response: ModelResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Parse(format!("malformed model response: {}", e)))?;

        let text = model_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or(VisionError::EmptyResponse)?;

        parse_candidate_hands(text)
    }
}

/// Parse candidate hands from model output text, tolerating markdown code
/// fences around the JSON.
pub(crate) fn parse_candidate_hands(text: &str) -> VisionResult<Vec<CandidateHand>> {
    let text = text.trim();
    let text = text.strip_prefix("```json").unwrap_or(text);
    let text = text.strip_prefix("```").unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);

    serde_json::from_str(text.trim())
        .map_err(|e| VisionError::Parse(format!("invalid candidate hands JSON: {}", e)))
}

#[async_trait]
impl HandAnalyzer for HttpHandAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> VisionResult<Vec<CandidateHand>> {
        let mut last_error = None;

        for model in &self.models {
            debug!("Analyzing {} frames with model {}", request.frames.len(), model);
            match self.call_model(model, request).await {
                Ok(hands) => {
                    info!("Model {} returned {} candidate hands", model, hands.len());
                    return Ok(hands);
                }
                Err(e) => {
                    warn!("Model {} failed: {}", model, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(VisionError::EmptyResponse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hands_plain_json() {
        let hands = parse_candidate_hands(
            r#"[{"handNumber": "1", "pot": 100,
                "players": [{"name": "A", "position": "BTN", "stackStart": 10}],
                "actions": [{"player": "A", "street": "preflop", "actionType": "bet"}]}]"#,
        )
        .unwrap();
        assert_eq!(hands.len(), 1);
        assert_eq!(hands[0].hand_number, "1");
    }

    #[test]
    fn test_parse_hands_with_code_fence() {
        let hands = parse_candidate_hands("```json\n[]\n```").unwrap();
        assert!(hands.is_empty());
    }

    #[test]
    fn test_parse_hands_rejects_garbage() {
        assert!(matches!(
            parse_candidate_hands("sorry, no hands found"),
            Err(VisionError::Parse(_))
        ));
    }

    #[test]
    fn test_prompt_mentions_frame_offsets() {
        let request = AnalysisRequest {
            frames: vec![FramePayload {
                index: 0,
                offset_secs: 62.0,
                jpeg: vec![0xff, 0xd8],
            }],
            readings: vec![],
        };
        let prompt = HttpHandAnalyzer::build_prompt(&request);
        assert!(prompt.contains("frame 0 at 62s"));
        assert!(prompt.contains("handNumber"));
    }
}
