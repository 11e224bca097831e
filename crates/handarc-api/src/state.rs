//! Application state.

use std::sync::Arc;

use anyhow::Context;

use handarc_db::{create_pool, HandStore, PgHandStore};
use handarc_media::{FfmpegFrameSource, TesseractOcr, YtDlpResolver};
use handarc_pipeline::{PipelineConfig, PipelineDeps};
use handarc_vision::{HttpHandAnalyzer, HttpJobRunner, VisionBatchClient};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: PipelineConfig,
    pub deps: PipelineDeps,
    pub store: Arc<dyn HandStore>,
}

impl AppState {
    /// Create new application state: connect to Postgres, run migrations,
    /// and wire the real pipeline components.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let pipeline = PipelineConfig::from_env()?;

        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let pool = create_pool(&database_url).await?;
        let pg = PgHandStore::new(pool);
        pg.migrate().await.context("running migrations")?;
        let store: Arc<dyn HandStore> = Arc::new(pg);

        let deps = PipelineDeps {
            resolver: Arc::new(YtDlpResolver::new()),
            frames: Arc::new(
                FfmpegFrameSource::new(&pipeline.temp_dir)
                    .with_interval(pipeline.frame_interval_secs),
            ),
            ocr: Arc::new(TesseractOcr::new()),
            analyzer: Arc::new(HttpHandAnalyzer::new(pipeline.vision_api_key.clone())),
            batch: Arc::new(VisionBatchClient::new(
                pipeline.vision_api_key.clone(),
                pipeline.batch_base_url.clone(),
            )),
            runner: Arc::new(HttpJobRunner::new(
                pipeline.runner_base_url.clone(),
                pipeline.runner_token.clone(),
            )),
            store: store.clone(),
        };

        Ok(Self {
            config,
            pipeline,
            deps,
            store,
        })
    }
}
