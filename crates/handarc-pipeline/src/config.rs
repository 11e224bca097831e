//! Pipeline configuration from environment variables.

use std::path::PathBuf;

use crate::error::{PipelineError, PipelineResult};

/// Runtime configuration for pipeline runs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base directory for per-run temp files.
    pub temp_dir: PathBuf,
    /// Vision API key.
    pub vision_api_key: String,
    /// Base URL of the vision batch API.
    pub batch_base_url: String,
    /// Base URL of the external job runner.
    pub runner_base_url: String,
    /// Job runner API token.
    pub runner_token: String,
    /// Seconds between sampled frames.
    pub frame_interval_secs: f64,
}

impl PipelineConfig {
    /// Load configuration from the environment. Secrets are required;
    /// everything else has a default.
    pub fn from_env() -> PipelineResult<Self> {
        let vision_api_key = require("VISION_API_KEY")?;
        let runner_token = require("RUNNER_API_TOKEN")?;

        let temp_dir = std::env::var("HANDARC_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("handarc"));

        let batch_base_url = std::env::var("BATCH_API_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());

        let runner_base_url = std::env::var("RUNNER_API_URL")
            .unwrap_or_else(|_| "https://api.trigger.dev/api/v1".to_string());

        let frame_interval_secs = std::env::var("FRAME_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2.0);

        Ok(Self {
            temp_dir,
            vision_api_key,
            batch_base_url,
            runner_base_url,
            runner_token,
            frame_interval_secs,
        })
    }
}

fn require(name: &'static str) -> PipelineResult<String> {
    std::env::var(name)
        .map_err(|_| PipelineError::invalid_input(format!("{} is not set", name)))
}
