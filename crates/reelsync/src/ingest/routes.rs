use crate::ingest::{IngestState, events_socket::events};

use reelsync_core::{ChunkArrival, CoreError, CropRect, NewRecording, Recording};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, instrument, warn};
use uuid::Uuid;

type ApiResult<T> = Result<T, (StatusCode, String)>;

/// Body of `POST /recordings`.
#[derive(Debug, Deserialize)]
pub(crate) struct CreateRecordingRequest {
    title: String,
    version: String,
    #[serde(default)]
    crop: Option<CropRect>,
}

/// Query of `POST /recordings/{id}/chunks`.
#[derive(Debug, Deserialize)]
pub(crate) struct ChunkQuery {
    index: u64,
    #[serde(default)]
    is_last: bool,
}

/// Build the ingest router.
pub(crate) fn router(state: IngestState) -> Router {
    Router::new()
        .route("/recordings", post(create_recording).get(list_recordings))
        .route("/recordings/{id}", get(get_recording))
        .route("/recordings/{id}/chunks", post(receive_chunk))
        .route("/recordings/{id}/cancel", post(cancel_recording))
        .route("/events", get(events))
        // Media recorder chunks exceed the 2 MB default.
        .layer(DefaultBodyLimit::disable())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[instrument(skip(state, request), fields(title = %request.title))]
async fn create_recording(
    State(state): State<IngestState>,
    Json(request): Json<CreateRecordingRequest>,
) -> ApiResult<(StatusCode, Json<Recording>)> {
    let recording = state
        .store
        .create_recording(NewRecording {
            title: request.title,
            version: request.version,
            crop: request.crop,
            records_root: state.records_root.clone(),
        })
        .map_err(|e| map_core_error(&state, e))?;

    info!(local_uuid = %recording.local_uuid, "Recording created");

    Ok((StatusCode::CREATED, Json(recording)))
}

async fn list_recordings(State(state): State<IngestState>) -> Json<Vec<Recording>> {
    Json(state.store.list_recordings())
}

async fn get_recording(
    State(state): State<IngestState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Recording>> {
    state
        .store
        .get_recording(id)
        .map(Json)
        .map_err(|e| map_core_error(&state, e))
}

#[instrument(skip(state, body), fields(local_uuid = %id, index = query.index, is_last = query.is_last, size = body.len()))]
async fn receive_chunk(
    State(state): State<IngestState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ChunkQuery>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let recording = state
        .store
        .get_recording(id)
        .map_err(|e| map_core_error(&state, e))?;

    if recording.status.is_canceled() {
        warn!("Chunk for canceled recording rejected");
        return Err((StatusCode::CONFLICT, "Recording is canceled".to_string()));
    }

    state
        .writer
        .receive(ChunkArrival::new(id, query.index, body.to_vec(), query.is_last))
        .await
        .map_err(|e| map_core_error(&state, e))?;

    Ok(StatusCode::ACCEPTED)
}

#[instrument(skip(state))]
async fn cancel_recording(
    State(state): State<IngestState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Recording>> {
    let recording = state
        .store
        .cancel_recording(id, Utc::now())
        .map_err(|e| map_core_error(&state, e))?;

    if recording.status.is_canceled() {
        state.writer.discard(id);
        info!(local_uuid = %id, "Recording canceled");
    }

    Ok(Json(recording))
}

fn map_core_error(state: &IngestState, e: CoreError) -> (StatusCode, String) {
    match e {
        CoreError::RecordingNotFound { .. } | CoreError::ChunkNotFound { .. } => {
            (StatusCode::NOT_FOUND, e.to_string())
        }
        e if e.is_disk_failure() => {
            let message = e.to_string();
            state.report_fatal(e);
            (StatusCode::INTERNAL_SERVER_ERROR, message)
        }
        e => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
