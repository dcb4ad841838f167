//! Request handlers.

use super::error::ApiError;
use super::AppState;
use crate::analysis::{collect_outcome, validate_len, BatchOutcome, PipelineEvent};
use crate::models::{AnalyzeRequest, RouterDecision};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// POST /api/analyze/stream
///
/// Validation happens before the response starts; a rejected request
/// gets a plain 400 instead of an event stream.
pub async fn analyze_stream(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(request) = payload?;
    info!("Streaming analysis of {} rows", request.rows.len());

    let events = state.pipeline.stream(request)?.map(|event| Ok(to_sse(&event)));

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

fn to_sse(event: &PipelineEvent) -> Event {
    match Event::default().json_data(event) {
        Ok(sse) => sse,
        Err(e) => {
            warn!("Failed to serialize pipeline event: {}", e);
            Event::default().comment("unserializable event")
        }
    }
}

/// POST /api/analyze
pub async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<BatchOutcome>, ApiError> {
    let Json(request) = payload?;
    info!("Batch analysis of {} rows", request.rows.len());

    let events = state.pipeline.stream(request)?;
    let outcome = collect_outcome(events, |event| {
        if let PipelineEvent::Progress { completed, total } = event {
            debug!("Progress {}/{}", completed, total);
        }
    })
    .await;

    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    #[serde(default)]
    pub texts: Vec<String>,
}

/// POST /api/route
pub async fn route(
    State(state): State<AppState>,
    payload: Result<Json<RouteRequest>, JsonRejection>,
) -> Result<Json<Vec<RouterDecision>>, ApiError> {
    let Json(request) = payload?;

    validate_len(request.texts.len(), state.pipeline.settings().max_rows)?;

    let decisions = state
        .pipeline
        .processor()
        .router()
        .route_batch(&request.texts, state.route_concurrency)
        .await;

    Ok(Json(decisions))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.model,
    }))
}
