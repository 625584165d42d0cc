//! End-to-end tests for the taskview server.
//!
//! Runs a real server on an ephemeral port against a temporary project and
//! drives it over HTTP: JSON endpoints, the event stream, and live reload.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{Value, json};
use taskview_core::{ChangeNotification, Channel, EventFrame};
use taskview_server::{Broadcaster, Server, ServerConfig};
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// A running server plus the handles needed to stop it.
struct TestServer {
    addr: SocketAddr,
    project: TempDir,
    broadcaster: Broadcaster,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start(setup: impl FnOnce(&Path)) -> Self {
        let project = TempDir::new().unwrap();
        let taskmaster = project.path().join(".taskmaster");
        std::fs::create_dir_all(taskmaster.join("tasks")).unwrap();
        std::fs::create_dir_all(taskmaster.join("docs")).unwrap();
        setup(&taskmaster);

        let mut config = ServerConfig::for_project(project.path());
        config.port = 0;
        config.debounce = Duration::from_millis(50);

        let server = Server::bind(config).await.expect("Failed to bind server");
        let addr = server.local_addr();
        let broadcaster = server.broadcaster().clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(async move {
            let _ = shutdown_rx.await;
        }));

        Self {
            addr,
            project,
            broadcaster,
            shutdown: Some(shutdown_tx),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn taskmaster(&self) -> std::path::PathBuf {
        self.project.path().join(".taskmaster")
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = reqwest::get(self.url(path)).await.expect("Request failed");
        let status = response.status().as_u16();
        let body = response.json().await.expect("Response was not JSON");
        (status, body)
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("Server did not shut down")
            .unwrap()
            .unwrap();
    }
}

/// Minimal reader of `data:` frames from an SSE response.
struct EventReader {
    stream: futures::stream::BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: String,
}

impl EventReader {
    async fn open(url: &str) -> Self {
        let response = reqwest::get(url).await.expect("Failed to open event stream");
        assert_eq!(response.status().as_u16(), 200);
        let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/event-stream"));
        Self {
            stream: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
            buffer: String::new(),
        }
    }

    async fn next_frame(&mut self) -> Option<EventFrame> {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let block: String = self.buffer.drain(..end + 2).collect();
                let data: Vec<&str> = block
                    .lines()
                    .filter_map(|line| line.strip_prefix("data:"))
                    .map(str::trim_start)
                    .collect();
                if data.is_empty() {
                    // Keep-alive comment
                    continue;
                }
                return Some(serde_json::from_str(&data.join("\n")).unwrap());
            }

            let chunk = self.stream.next().await?.ok()?;
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }

    async fn expect_frame(&mut self) -> EventFrame {
        timeout(Duration::from_secs(10), self.next_frame())
            .await
            .expect("Timed out waiting for event")
            .expect("Event stream ended")
    }
}

fn legacy_tasks(taskmaster: &Path) {
    std::fs::write(
        taskmaster.join("tasks/tasks.json"),
        json!({"tasks": [
            {"id": 1, "title": "Set up", "status": "done", "priority": "high"},
            {"id": 2, "title": "Build", "status": "pending",
             "subtasks": [{"id": 1, "title": "Parser", "status": "pending"}]}
        ]})
        .to_string(),
    )
    .unwrap();
    std::fs::write(taskmaster.join("docs/prd.md"), "# Product").unwrap();
    std::fs::write(taskmaster.join("state.json"), r#"{"currentTag": "master"}"#).unwrap();
}

#[tokio::test]
async fn test_json_endpoints() {
    let server = TestServer::start(legacy_tasks).await;

    let (status, project) = server.get("/api/project").await;
    assert_eq!(status, 200);
    assert_eq!(project["currentTag"], "master");
    assert_eq!(project["port"], server.addr.port());

    let (_, tasks) = server.get("/api/tasks").await;
    assert_eq!(tasks["format"], "legacy");
    assert_eq!(tasks["tags"], json!(["master"]));
    assert_eq!(tasks["tasks"][1]["subtasks"][0]["id"], "2.1");

    let (_, tag) = server.get("/api/tasks/master").await;
    assert_eq!(tag["tasks"].as_array().unwrap().len(), 2);
    let (_, unknown) = server.get("/api/tasks/other").await;
    assert_eq!(unknown, json!({"tasks": []}));

    let (_, stats) = server.get("/api/stats").await;
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["byStatus"]["done"], 1);
    assert_eq!(stats["byPriority"]["none"], 1);
    assert_eq!(stats["byTag"]["master"], 2);

    let (_, prds) = server.get("/api/prds").await;
    assert_eq!(prds["prds"][0]["name"], "prd.md");
    assert_eq!(prds["prds"][0]["size"], 9);

    let (status, prd) = server.get("/api/prds/prd.md").await;
    assert_eq!(status, 200);
    assert_eq!(prd, json!({"filename": "prd.md", "content": "# Product"}));

    let (status, missing) = server.get("/api/prds/missing.md").await;
    assert_eq!(status, 404);
    assert_eq!(missing, json!({"error": "PRD not found"}));

    server.stop().await;
}

#[tokio::test]
async fn test_missing_tasks_file_reports_none() {
    let server = TestServer::start(|_| {}).await;

    let (status, tasks) = server.get("/api/tasks").await;
    assert_eq!(status, 200);
    assert_eq!(tasks, json!({"tasks": [], "format": "none", "tags": []}));

    let (_, prds) = server.get("/api/prds").await;
    assert_eq!(prds, json!({"prds": []}));

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_tasks_is_server_error() {
    let server = TestServer::start(|taskmaster| {
        std::fs::write(
            taskmaster.join("tasks/tasks.json"),
            r#"{"tasks": [{"id": "1.2", "title": "dotted"}]}"#,
        )
        .unwrap();
    })
    .await;

    let (status, body) = server.get("/api/tasks").await;
    assert_eq!(status, 500);
    assert!(body["error"].as_str().unwrap().contains("1.2"));

    // Other endpoints keep working
    let (status, _) = server.get("/api/prds").await;
    assert_eq!(status, 200);

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_path_is_json_404_without_assets() {
    let server = TestServer::start(|_| {}).await;

    let (status, body) = server.get("/index.html").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "Not found");

    server.stop().await;
}

#[tokio::test]
async fn test_event_stream_starts_with_connected() {
    let server = TestServer::start(legacy_tasks).await;

    let mut events = EventReader::open(&server.url("/api/events")).await;
    assert_eq!(events.expect_frame().await, EventFrame::Connected);

    server.stop().await;
}

#[tokio::test]
async fn test_task_write_pushes_tasks_updated() {
    let server = TestServer::start(legacy_tasks).await;
    let mut events = EventReader::open(&server.url("/api/events")).await;
    assert_eq!(events.expect_frame().await, EventFrame::Connected);

    // Several writes in quick succession are one change
    let tasks_file = server.taskmaster().join("tasks/tasks.json");
    for status in ["pending", "in-progress", "done"] {
        std::fs::write(
            &tasks_file,
            json!({"tasks": [{"id": 1, "title": "Set up", "status": status}]}).to_string(),
        )
        .unwrap();
    }

    let frame = events.expect_frame().await;
    assert!(matches!(frame, EventFrame::TasksUpdated { timestamp: Some(_) }));

    let (_, tasks) = server.get("/api/tasks").await;
    assert_eq!(tasks["tasks"][0]["status"], "done");

    server.stop().await;
}

#[tokio::test]
async fn test_document_write_pushes_prds_updated() {
    let server = TestServer::start(legacy_tasks).await;
    let mut events = EventReader::open(&server.url("/api/events")).await;
    assert_eq!(events.expect_frame().await, EventFrame::Connected);

    std::fs::write(server.taskmaster().join("docs/notes.txt"), "notes").unwrap();

    let frame = events.expect_frame().await;
    assert!(matches!(frame, EventFrame::PrdsUpdated { .. }));

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_with_open_stream() {
    let server = TestServer::start(legacy_tasks).await;
    let mut events = EventReader::open(&server.url("/api/events")).await;
    assert_eq!(events.expect_frame().await, EventFrame::Connected);

    // Must not hang on the open stream
    server.stop().await;

    let end = timeout(Duration::from_secs(5), events.next_frame())
        .await
        .expect("Stream did not end after shutdown");
    assert!(end.is_none());
}

#[tokio::test]
async fn test_closed_stream_unsubscribes() {
    let server = TestServer::start(legacy_tasks).await;

    let mut events = EventReader::open(&server.url("/api/events")).await;
    assert_eq!(events.expect_frame().await, EventFrame::Connected);
    assert_eq!(server.broadcaster.subscriber_count(), 1);

    drop(events);

    // The server notices the closed connection on its next write at the latest
    timeout(Duration::from_secs(5), async {
        while server.broadcaster.subscriber_count() > 0 {
            server
                .broadcaster
                .publish(ChangeNotification::now(Channel::Tasks));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("Subscriber was not removed");

    server.stop().await;
}
