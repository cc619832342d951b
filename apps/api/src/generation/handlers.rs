//! Axum route handlers for article generation and key-pool operations.

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{info, warn};

use crate::credentials::{PoolHealth, Service};
use crate::errors::AppError;
use crate::generation::pipeline::ArticleRequest;
use crate::generation::progress::ProgressEmitter;
use crate::state::AppState;

/// Events buffered between the run and a slow client.
const PROGRESS_BUFFER: usize = 32;

const RUN_ENDED_ERROR: &str = "Generation ended unexpectedly. Please try again.";

/// POST /api/v1/content/auto-generate
///
/// Streams newline-delimited JSON progress events, ending with exactly one
/// `complete` or `error` event. The run keeps going if the client disconnects.
/// A body that is not a valid request is reported on the stream too.
pub async fn handle_auto_generate(
    State(state): State<AppState>,
    payload: Result<Json<ArticleRequest>, JsonRejection>,
) -> Response {
    let (mut emitter, rx) = ProgressEmitter::channel(PROGRESS_BUFFER);
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        match payload {
            Ok(Json(request)) => pipeline.run(request, &mut emitter).await,
            Err(rejection) => {
                warn!("Rejected auto-generate body: {rejection}");
                emitter.error(rejection.body_text()).await;
            }
        }
        emitter.finish_open(RUN_ENDED_ERROR).await;
    });

    let stream = ReceiverStream::new(rx)
        .map(|event| Ok::<_, Infallible>(Bytes::from(event.to_line())));

    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// GET /api/v1/keys/:service/health
pub async fn handle_key_health(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<PoolHealth>, AppError> {
    let service = parse_service(&service)?;
    Ok(Json(state.keys.health_snapshot(service).await))
}

/// POST /api/v1/keys/:service/reset
///
/// Clears every key's failure state and returns the fresh snapshot.
pub async fn handle_key_reset(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<PoolHealth>, AppError> {
    let service = parse_service(&service)?;
    state.keys.reset(service).await;
    info!("{} key pool reset by operator", service.label());
    Ok(Json(state.keys.health_snapshot(service).await))
}

fn parse_service(raw: &str) -> Result<Service, AppError> {
    raw.parse::<Service>().map_err(AppError::NotFound)
}
