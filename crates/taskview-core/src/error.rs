//! Error types shared by the server and the client.

use thiserror::Error;

use crate::model::TaskId;

/// Problems found while parsing or validating a tasks file.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid task JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unrecognized tasks file shape: {0}")]
    Shape(String),

    #[error("Duplicate task id {id} in tag {tag}")]
    DuplicateId { tag: String, id: TaskId },

    #[error("Top-level task id {0} must not contain '.'")]
    DottedTopLevel(TaskId),

    #[error("Task id {id} is nested under {ancestor} but does not carry its prefix")]
    ForeignPrefix { id: TaskId, ancestor: TaskId },

    #[error("Task {0} is nested deeper than {max} levels", max = crate::tree::MAX_DEPTH)]
    TooDeep(TaskId),
}

/// Failure to fetch a resource from the viewer's data source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}
