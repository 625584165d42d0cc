//! HTTP handlers for the JSON API and the event stream.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt};
use serde_json::json;
use taskview_core::project::{DocumentList, TagTasks};
use taskview_core::{Document, ProjectInfo, TaskStats, TasksResponse};
use tracing::{debug, error};

use crate::broadcast::Broadcaster;
use crate::store::{ProjectStore, StoreError};

/// Shared application state
pub struct AppState {
    pub store: ProjectStore,
    pub broadcaster: Broadcaster,
    /// Port actually bound, reported in project info
    pub port: Option<u16>,
}

/// Error returned by API handlers, rendered as `{ "error": message }`.
#[derive(Debug)]
pub enum ApiError {
    NotFound(&'static str),
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.to_string()),
            ApiError::Store(e) => {
                error!("Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn project(State(state): State<Arc<AppState>>) -> ApiResult<ProjectInfo> {
    Ok(Json(state.store.project(state.port).await?))
}

pub async fn tasks(State(state): State<Arc<AppState>>) -> ApiResult<TasksResponse> {
    Ok(Json(state.store.tasks().await?))
}

pub async fn tag_tasks(
    State(state): State<Arc<AppState>>,
    Path(tag): Path<String>,
) -> ApiResult<TagTasks> {
    let tasks = state.store.tasks_for_tag(&tag).await?;
    Ok(Json(TagTasks { tasks }))
}

pub async fn documents(State(state): State<Arc<AppState>>) -> ApiResult<DocumentList> {
    let prds = state.store.documents().await?;
    Ok(Json(DocumentList { prds }))
}

pub async fn document(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> ApiResult<Document> {
    match state.store.document(&filename).await? {
        Some(document) => Ok(Json(document)),
        None => Err(ApiError::NotFound("PRD not found")),
    }
}

pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<TaskStats> {
    Ok(Json(state.store.stats().await?))
}

/// Server-Sent Events stream of change frames.
///
/// The subscriber lives as long as the response body; a client disconnect
/// drops it and unsubscribes.
pub async fn events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let subscriber = state.broadcaster.subscribe();
    debug!("Opening event stream {}", subscriber.id());

    let stream = subscriber
        .into_stream()
        .map(|frame| Event::default().json_data(frame));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// JSON 404 for paths outside the API when no UI assets are configured.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("Not found")
}
