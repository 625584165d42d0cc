//! Project metadata and requirement documents as served by the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::TaskRecord;

/// Body of `GET /api/project`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub project_name: String,
    pub project_path: String,
    pub current_tag: String,
    /// Port the viewer is listening on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Raw `.taskmaster/config.json`
    #[serde(default)]
    pub config: Value,
    /// Raw `.taskmaster/state.json`
    #[serde(default)]
    pub state: Value,
}

/// Listing entry for a requirements document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Body of `GET /api/prds/{filename}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub filename: String,
    pub content: String,
}

/// Body of `GET /api/prds`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentList {
    #[serde(default)]
    pub prds: Vec<DocumentMeta>,
}

/// Body of `GET /api/tasks/{tag}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TagTasks {
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
}
