//! `DataSource` backed by a viewer's HTTP API.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use taskview_core::project::{DocumentList, TagTasks};
use taskview_core::{
    DataSource, Document, DocumentMeta, FetchError, ProjectInfo, TaskRecord, TaskStats,
    TasksResponse,
};
use tracing::debug;

use crate::error::{ClientError, Result};

/// Body of an API error response.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    /// Source for a server at `base_url` (e.g. `http://localhost:3737`).
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self> {
        let trimmed = base_url.trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ClientError::InvalidUrl {
                url: base_url.to_string(),
                reason: "expected an http:// or https:// URL".to_string(),
            });
        }
        Ok(Self {
            client,
            base_url: trimmed.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET a JSON resource. `Ok(None)` on 404.
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> std::result::Result<Option<T>, FetchError> {
        let url = self.url(path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            // Prefer the server's `{ "error": ... }` message when it sent one
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or(text);
            return Err(FetchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| FetchError::Decode(format!("{}: {}", url, e)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> std::result::Result<T, FetchError> {
        self.get_optional(path)
            .await?
            .ok_or_else(|| FetchError::Status {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: format!("{} not found", path),
            })
    }
}

#[async_trait]
impl DataSource for HttpSource {
    async fn project(&self) -> std::result::Result<ProjectInfo, FetchError> {
        self.get("/api/project").await
    }

    async fn tasks(&self) -> std::result::Result<TasksResponse, FetchError> {
        self.get("/api/tasks").await
    }

    async fn tasks_for_tag(&self, tag: &str) -> std::result::Result<Vec<TaskRecord>, FetchError> {
        let body: TagTasks = self
            .get(&format!("/api/tasks/{}", urlencoding::encode(tag)))
            .await?;
        Ok(body.tasks)
    }

    async fn stats(&self) -> std::result::Result<TaskStats, FetchError> {
        self.get("/api/stats").await
    }

    async fn documents(&self) -> std::result::Result<Vec<DocumentMeta>, FetchError> {
        let body: DocumentList = self.get("/api/prds").await?;
        Ok(body.prds)
    }

    async fn document(&self, filename: &str) -> std::result::Result<Option<Document>, FetchError> {
        self.get_optional(&format!("/api/prds/{}", urlencoding::encode(filename)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let source = HttpSource::new("http://localhost:3737/").unwrap();
        assert_eq!(source.base_url(), "http://localhost:3737");
        assert_eq!(source.url("/api/tasks"), "http://localhost:3737/api/tasks");
    }

    #[test]
    fn test_non_http_url_is_rejected() {
        assert!(matches!(
            HttpSource::new("localhost:3737"),
            Err(ClientError::InvalidUrl { .. })
        ));
    }
}
