//! Read-only access to a project's `.taskmaster` directory.
//!
//! Every call reads and parses from disk. Missing files and directories are
//! reported as empty results, malformed content as `StoreError`.

use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use taskview_core::model::TaskFile;
use taskview_core::{Document, DocumentMeta, ModelError, ProjectInfo, TaskRecord, TaskStats, TasksResponse};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::config::ServerConfig;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid tasks in {path}: {source}")]
    InvalidTasks {
        path: PathBuf,
        #[source]
        source: ModelError,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Extensions listed as requirement documents.
const DOCUMENT_EXTENSIONS: [&str; 2] = [".md", ".txt"];

/// Whether a file name in the docs directory is a listable document.
pub fn is_document_name(name: &str) -> bool {
    !name.starts_with('.') && DOCUMENT_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Reader over one project's task database and documents.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    config: ServerConfig,
}

impl ProjectStore {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Parsed `tasks.json`, or `None` when the file does not exist.
    pub async fn task_file(&self) -> Result<Option<TaskFile>> {
        let path = self.config.tasks_file();
        let Some(json) = read_optional(&path).await? else {
            debug!("No tasks file at {}", path.display());
            return Ok(None);
        };

        match TaskFile::parse(&json) {
            Ok(file) => Ok(Some(file)),
            Err(ModelError::Json(source)) => Err(StoreError::Json { path, source }),
            Err(source) => Err(StoreError::InvalidTasks { path, source }),
        }
    }

    pub async fn tasks(&self) -> Result<TasksResponse> {
        Ok(self
            .task_file()
            .await?
            .map(TaskFile::into_response)
            .unwrap_or_else(TasksResponse::empty))
    }

    /// Top-level tasks of one tag; unknown tags and missing files are empty.
    pub async fn tasks_for_tag(&self, tag: &str) -> Result<Vec<TaskRecord>> {
        Ok(self
            .task_file()
            .await?
            .map(|file| file.tasks_for_tag(tag).to_vec())
            .unwrap_or_default())
    }

    pub async fn stats(&self) -> Result<TaskStats> {
        Ok(self
            .task_file()
            .await?
            .map(|file| TaskStats::from_file(&file))
            .unwrap_or_default())
    }

    /// Project metadata from `config.json` and `state.json`.
    pub async fn project(&self, port: Option<u16>) -> Result<ProjectInfo> {
        let config = read_json_object(&self.config.config_file()).await?;
        let state = read_json_object(&self.config.state_file()).await?;

        let current_tag = state
            .get("currentTag")
            .and_then(Value::as_str)
            .filter(|tag| !tag.is_empty())
            .unwrap_or(TaskFile::DEFAULT_TAG)
            .to_string();

        Ok(ProjectInfo {
            project_name: self.config.project_name(),
            project_path: self.config.project_dir.display().to_string(),
            current_tag,
            port,
            config,
            state,
        })
    }

    /// Documents in the docs directory, sorted by name.
    pub async fn documents(&self) -> Result<Vec<DocumentMeta>> {
        let dir = self.config.docs_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        };

        let mut documents = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => return Err(StoreError::Io { path: dir, source }),
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_document_name(&name) {
                continue;
            }

            let path = entry.path();
            let metadata = match fs::metadata(&path).await {
                Ok(metadata) => metadata,
                // Deleted between listing and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => return Err(StoreError::Io { path, source }),
            };
            if !metadata.is_file() {
                continue;
            }

            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            documents.push(DocumentMeta {
                path: name.clone(),
                name,
                size: metadata.len(),
                modified,
            });
        }

        documents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(documents)
    }

    /// One document's content, or `None` if it does not exist.
    ///
    /// Names that would escape the docs directory are treated as missing.
    pub async fn document(&self, filename: &str) -> Result<Option<Document>> {
        if !is_plain_file_name(filename) {
            debug!("Rejecting document name {:?}", filename);
            return Ok(None);
        }

        let path = self.config.docs_dir().join(filename);
        Ok(read_optional(&path).await?.map(|content| Document {
            filename: filename.to_string(),
            content,
        }))
    }
}

/// A single normal path component, so `v1..2.md` is fine but `..` is not.
fn is_plain_file_name(name: &str) -> bool {
    if name.contains('\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == name
    )
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Read a JSON file, `{}` when missing.
async fn read_json_object(path: &Path) -> Result<Value> {
    match read_optional(path).await? {
        Some(json) => serde_json::from_str(&json).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        }),
        None => Ok(Value::Object(Map::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskview_core::TaskFormat;
    use tempfile::TempDir;

    fn project() -> (TempDir, ProjectStore) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".taskmaster/tasks")).unwrap();
        std::fs::create_dir_all(dir.path().join(".taskmaster/docs")).unwrap();
        let store = ProjectStore::new(ServerConfig::for_project(dir.path()));
        (dir, store)
    }

    fn write(dir: &TempDir, relative: &str, content: &str) {
        std::fs::write(dir.path().join(".taskmaster").join(relative), content).unwrap();
    }

    #[tokio::test]
    async fn test_missing_tasks_file_is_none_format() {
        let (_dir, store) = project();

        let tasks = store.tasks().await.unwrap();
        assert_eq!(tasks.format, TaskFormat::None);
        assert_eq!(
            serde_json::to_value(&tasks).unwrap(),
            serde_json::json!({"tasks": [], "format": "none", "tags": []})
        );
        assert_eq!(store.stats().await.unwrap(), TaskStats::default());
    }

    #[tokio::test]
    async fn test_legacy_and_tagged_shapes() {
        let (dir, store) = project();

        write(&dir, "tasks/tasks.json", r#"{"tasks": [{"id": 1, "title": "A"}]}"#);
        let tasks = store.tasks().await.unwrap();
        assert_eq!(tasks.format, TaskFormat::Legacy);
        assert_eq!(tasks.tags, vec!["master"]);
        assert_eq!(store.tasks_for_tag("master").await.unwrap().len(), 1);
        assert!(store.tasks_for_tag("feature").await.unwrap().is_empty());

        write(
            &dir,
            "tasks/tasks.json",
            r#"{"master": {"tasks": []}, "feature": {"tasks": [{"id": 1}]}}"#,
        );
        let tasks = store.tasks().await.unwrap();
        assert_eq!(tasks.format, TaskFormat::Tagged);
        assert_eq!(tasks.tags, vec!["master", "feature"]);
        assert_eq!(store.tasks_for_tag("feature").await.unwrap().len(), 1);
        assert!(store.tasks_for_tag("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_json_and_duplicate_ids_are_errors() {
        let (dir, store) = project();

        write(&dir, "tasks/tasks.json", "{not json");
        assert!(matches!(store.tasks().await, Err(StoreError::Json { .. })));

        write(&dir, "tasks/tasks.json", r#"{"tasks": [{"id": 1}, {"id": 1}]}"#);
        assert!(matches!(
            store.tasks().await,
            Err(StoreError::InvalidTasks {
                source: ModelError::DuplicateId { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_project_info_reads_state() {
        let (dir, store) = project();

        let info = store.project(None).await.unwrap();
        assert_eq!(info.current_tag, "master");
        assert_eq!(info.config, serde_json::json!({}));

        write(&dir, "state.json", r#"{"currentTag": "feature-x"}"#);
        write(&dir, "config.json", r#"{"models": {"main": "x"}}"#);
        let info = store.project(Some(3737)).await.unwrap();
        assert_eq!(info.current_tag, "feature-x");
        assert_eq!(info.port, Some(3737));
        assert_eq!(info.config["models"]["main"], "x");
    }

    #[tokio::test]
    async fn test_documents_listing_filters_and_sorts() {
        let (dir, store) = project();
        write(&dir, "docs/b.txt", "bee");
        write(&dir, "docs/a.md", "# A");
        write(&dir, "docs/.hidden.md", "secret");
        write(&dir, "docs/notes.json", "{}");

        let docs = store.documents().await.unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a.md", "b.txt"]);
        assert_eq!(docs[1].size, 3);
        assert_eq!(docs[0].path, "a.md");
    }

    #[tokio::test]
    async fn test_missing_docs_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".taskmaster")).unwrap();
        let store = ProjectStore::new(ServerConfig::for_project(dir.path()));

        assert!(store.documents().await.unwrap().is_empty());
        assert!(store.document("a.md").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_document_names_cannot_escape_docs_dir() {
        let (dir, store) = project();
        write(&dir, "docs/prd.md", "# PRD");
        write(&dir, "config.json", "{}");

        let doc = store.document("prd.md").await.unwrap().unwrap();
        assert_eq!(doc.content, "# PRD");

        assert!(store.document("../config.json").await.unwrap().is_none());
        assert!(store.document("sub/prd.md").await.unwrap().is_none());
        assert!(store.document("missing.md").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dotted_document_names_open() {
        let (dir, store) = project();
        write(&dir, "docs/v1..2-notes.md", "# Changes");

        let docs = store.documents().await.unwrap();
        assert_eq!(docs[0].name, "v1..2-notes.md");

        let doc = store.document("v1..2-notes.md").await.unwrap().unwrap();
        assert_eq!(doc.content, "# Changes");

        assert!(store.document("..").await.unwrap().is_none());
        assert!(store.document(".").await.unwrap().is_none());
        assert!(store.document("").await.unwrap().is_none());
        assert!(store.document("..\\config.json").await.unwrap().is_none());
    }

    #[test]
    fn test_document_names() {
        assert!(is_document_name("prd.md"));
        assert!(is_document_name("notes.txt"));
        assert!(!is_document_name(".draft.md"));
        assert!(!is_document_name("tasks.json"));
    }
}
