//! End-to-end tests for following a live server.
//!
//! Starts a real taskview server on an ephemeral port, follows it with the
//! HTTP source and event stream, and edits the project on disk.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;
use taskview_client::{HttpSource, LogRenderer, SessionDriver, follow};
use taskview_core::{
    Channel, ClientSession, ClientViewState, DataSource, EventFrame, Interaction,
    SelectionOutcome, TaskFormat,
};
use taskview_server::{Server, ServerConfig};
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

struct Fixture {
    project: TempDir,
    base_url: String,
    shutdown: oneshot::Sender<()>,
}

impl Fixture {
    async fn start() -> Self {
        let project = TempDir::new().unwrap();
        let taskmaster = project.path().join(".taskmaster");
        std::fs::create_dir_all(taskmaster.join("tasks")).unwrap();
        std::fs::create_dir_all(taskmaster.join("docs")).unwrap();

        let fixture_tasks = json!({
            "master": {"tasks": [
                {"id": 1, "title": "Design", "status": "done"},
                {"id": 3, "title": "Build", "status": "pending", "subtasks": [
                    {"id": 1, "title": "Parser", "status": "pending"},
                    {"id": 2, "title": "Lexer", "status": "done"}
                ]}
            ]},
            "feature": {"tasks": [{"id": 1, "title": "Spike", "status": "pending"}]}
        });
        std::fs::write(taskmaster.join("tasks/tasks.json"), fixture_tasks.to_string()).unwrap();
        std::fs::write(taskmaster.join("docs/prd.md"), "# v1").unwrap();

        let mut config = ServerConfig::for_project(project.path());
        config.port = 0;
        config.debounce = Duration::from_millis(50);
        let server = Server::bind(config).await.unwrap();
        let base_url = format!("http://{}", server.local_addr());

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(server.serve(async move {
            let _ = shutdown_rx.await;
        }));

        Self {
            project,
            base_url,
            shutdown,
        }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.project.path().join(".taskmaster").join(relative)
    }
}

async fn next_frame(frames: &mut mpsc::Receiver<EventFrame>) -> EventFrame {
    timeout(Duration::from_secs(10), frames.recv())
        .await
        .expect("Timed out waiting for frame")
        .expect("Frame stream ended")
}

#[tokio::test]
async fn test_http_source_reads_every_resource() {
    let fixture = Fixture::start().await;
    let source = HttpSource::new(&fixture.base_url).unwrap();

    let project = source.project().await.unwrap();
    assert_eq!(project.current_tag, "master");

    let tasks = source.tasks().await.unwrap();
    assert_eq!(tasks.format, TaskFormat::Tagged);
    assert_eq!(tasks.tags, vec!["master", "feature"]);

    let feature = source.tasks_for_tag("feature").await.unwrap();
    assert_eq!(feature[0].title, "Spike");

    let stats = source.stats().await.unwrap();
    assert_eq!(stats.total, 3);

    let documents = source.documents().await.unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(source.document("prd.md").await.unwrap().unwrap().content, "# v1");
    assert!(source.document("nope.md").await.unwrap().is_none());

    let _ = fixture.shutdown.send(());
}

#[tokio::test]
async fn test_live_edit_reconciles_selection_and_filters() {
    let fixture = Fixture::start().await;
    let source = HttpSource::new(&fixture.base_url).unwrap();
    let (mut frames, stream_task) = follow(
        source.client().clone(),
        source.url("/api/events"),
        Duration::from_millis(100),
    );

    let mut driver = SessionDriver::new(
        ClientSession::new(ClientViewState::default()),
        source,
        LogRenderer::new(),
    );

    let connected = next_frame(&mut frames).await;
    assert_eq!(connected, EventFrame::Connected);
    driver.handle_frame(connected).await;
    assert!(driver.is_loaded());

    driver.interact(Interaction::SelectTask("3.1".into())).await.unwrap();
    driver.interact(Interaction::ToggleExpanded("3".into())).await.unwrap();
    driver
        .interact(Interaction::ToggleStatus("pending".to_string()))
        .await
        .unwrap();
    let filters = driver.session().state().filters.clone();

    // Rename the selected subtask on disk
    let updated = json!({
        "master": {"tasks": [
            {"id": 3, "title": "Build", "status": "pending", "subtasks": [
                {"id": 1, "title": "Parser v2", "status": "in-progress"}
            ]}
        ]},
        "feature": {"tasks": []}
    });
    std::fs::write(fixture.path("tasks/tasks.json"), updated.to_string()).unwrap();

    let frame = next_frame(&mut frames).await;
    assert!(matches!(frame, EventFrame::TasksUpdated { .. }));
    let outcomes = driver.handle_frame(frame).await;

    assert_eq!(outcomes[0].channel, Channel::Tasks);
    assert_eq!(outcomes[0].selection, SelectionOutcome::Kept("3.1".into()));
    assert_eq!(driver.session().selected_task().unwrap().title, "Parser v2");
    assert_eq!(driver.session().state().filters, filters);
    assert!(driver.session().state().expanded_ids.contains("3"));
    assert!(driver.renderer().renders() >= 4);
    let summary = driver.renderer().last_summary().unwrap();
    assert!(summary.contains("(filtered)"));
    assert!(summary.contains("\"Parser v2\""));

    stream_task.abort();
    let _ = fixture.shutdown.send(());
}

#[tokio::test]
async fn test_deleted_document_is_closed() {
    let fixture = Fixture::start().await;
    let source = HttpSource::new(&fixture.base_url).unwrap();
    let (mut frames, stream_task) = follow(
        source.client().clone(),
        source.url("/api/events"),
        Duration::from_millis(100),
    );
    let mut driver = SessionDriver::new(
        ClientSession::new(ClientViewState::default()),
        source,
        LogRenderer::new(),
    );

    driver.handle_frame(next_frame(&mut frames).await).await;
    driver
        .interact(Interaction::SelectDocument("prd.md".to_string()))
        .await
        .unwrap();
    assert!(driver.session().document().is_some());

    std::fs::remove_file(fixture.path("docs/prd.md")).unwrap();

    let frame = next_frame(&mut frames).await;
    assert!(matches!(frame, EventFrame::PrdsUpdated { .. }));
    let outcomes = driver.handle_frame(frame).await;

    assert!(outcomes[0].document_cleared);
    assert!(driver.session().document().is_none());

    stream_task.abort();
    let _ = fixture.shutdown.send(());
}
