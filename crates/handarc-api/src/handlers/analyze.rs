//! SSE analysis handlers.
//!
//! Both endpoints return an SSE stream immediately and run the pipeline on
//! a spawned task; every progress event, including validation failures,
//! arrives in-stream rather than as an HTTP error. When the client drops
//! the connection the receiver closes and the run stops retrying.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use handarc_models::{PipelineEvent, RegionMap, StreamId, VideoSegment};
use handarc_pipeline::{
    progress_channel, run_analysis, run_extraction, AnalyzeRequest, ExtractRequest,
};

use crate::state::AppState;

/// Body shared by both SSE endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeBody {
    pub stream_id: StreamId,
    pub url: String,
    pub segment: VideoSegment,
    pub regions: RegionMap,
}

/// Analyze a short segment synchronously, streaming progress over SSE.
pub async fn analyze_stream(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeBody>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(
        "Starting analysis of stream {} [{:.0}s..{:.0}s]",
        body.stream_id, body.segment.start, body.segment.end
    );

    let (tx, rx) = progress_channel();
    let request = AnalyzeRequest {
        stream_id: body.stream_id,
        url: body.url,
        segment: body.segment,
        regions: body.regions,
    };
    tokio::spawn(run_analysis(state.deps.clone(), tx, request));

    sse_response(rx)
}

/// Extract a long segment: frames and OCR run now, vision goes to the
/// batch API. Progress streams over SSE and ends with the batch id.
pub async fn extract_stream(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeBody>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(
        "Starting extraction of stream {} [{:.0}s..{:.0}s]",
        body.stream_id, body.segment.start, body.segment.end
    );

    let (tx, rx) = progress_channel();
    let request = ExtractRequest {
        stream_id: body.stream_id,
        url: body.url,
        segment: body.segment,
        regions: body.regions,
    };
    let deps = state.deps.clone();
    tokio::spawn(async move {
        let _ = run_extraction(deps, tx, request).await;
    });

    sse_response(rx)
}

fn sse_response(
    rx: UnboundedReceiver<PipelineEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        let frame = Event::default()
            .event(event.event_name())
            .data(event.data_json());
        Some((Ok(frame), rx))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
