//! Client-side reconciliation of fresh data into a session's view.
//!
//! A `ClientSession` owns one browser-like session: its `ClientViewState` plus
//! the last data fetched for it. When a `ChangeNotification` arrives the
//! session goes `Idle -> Reconciling -> Idle`:
//!
//! 1. snapshot user context (selection, expanded ids, scroll offsets)
//! 2. re-fetch the whole affected resource from the `DataSource`
//! 3. re-resolve the selected task by id, or clear it if it is gone
//! 4. prune expanded ids that no longer exist, leave filters alone
//! 5. render, then restore scroll offsets once layout has settled
//!
//! Notifications are processed one at a time by the caller. Every pass
//! re-fetches full state, so when two arrive back to back the later fetch wins.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::event::{ChangeNotification, Channel};
use crate::filter::TaskFilter;
use crate::model::{TaskFile, TaskId, TaskRecord, TasksResponse};
use crate::project::{Document, DocumentMeta, ProjectInfo};
use crate::stats::TaskStats;
use crate::tree;
use crate::view::{self, ClientViewState, View};

/// Where a session reads its data from (normally the viewer's HTTP API).
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn project(&self) -> Result<ProjectInfo, FetchError>;

    async fn tasks(&self) -> Result<TasksResponse, FetchError>;

    async fn tasks_for_tag(&self, tag: &str) -> Result<Vec<TaskRecord>, FetchError>;

    async fn stats(&self) -> Result<TaskStats, FetchError>;

    async fn documents(&self) -> Result<Vec<DocumentMeta>, FetchError>;

    /// Returns `Ok(None)` when the document does not exist.
    async fn document(&self, filename: &str) -> Result<Option<Document>, FetchError>;
}

/// Presentation layer driven by the session.
pub trait Renderer: Send {
    fn render(&mut self, frame: &RenderFrame<'_>);

    fn render_error(&mut self, message: &str);

    /// Current scroll offsets of the rendered views, keyed by view name.
    fn scroll_offsets(&self) -> BTreeMap<String, f64>;

    /// Apply a scroll offset. Returns `false` while layout is not ready yet.
    fn restore_scroll(&mut self, view: &str, offset: f64) -> bool;
}

/// Everything a renderer needs for one pass.
#[derive(Debug)]
pub struct RenderFrame<'a> {
    pub state: &'a ClientViewState,
    pub project: Option<&'a ProjectInfo>,
    pub current_tag: &'a str,
    pub tags: &'a [String],
    /// Tasks left after filtering, as a forest
    pub tasks: Vec<TaskRecord>,
    /// Number of visible tasks including subtasks
    pub visible_count: usize,
    pub selected_task: Option<&'a TaskRecord>,
    pub stats: Option<&'a TaskStats>,
    pub documents: &'a [DocumentMeta],
    pub document: Option<&'a Document>,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Failed to fetch {resource}: {source}")]
    Fetch {
        resource: &'static str,
        #[source]
        source: FetchError,
    },
}

fn fetch_failed(resource: &'static str) -> impl FnOnce(FetchError) -> ReconcileError {
    move |source| ReconcileError::Fetch { resource, source }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Reconciling,
}

/// What happened to the task selection during a reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    Unselected,
    Kept(TaskId),
    Cleared(TaskId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub channel: Channel,
    pub selection: SelectionOutcome,
    pub document_cleared: bool,
    /// Expanded ids dropped because their task no longer exists
    pub pruned_expanded: usize,
}

/// Retry policy for restoring scroll offsets after a render.
#[derive(Debug, Clone, Copy)]
pub struct ScrollRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ScrollRetry {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(10),
        }
    }
}

/// User interactions, keyed by stable ids rather than rendered elements.
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    SelectTask(TaskId),
    CloseDetail,
    ToggleExpanded(TaskId),
    ToggleDetailExpanded(TaskId),
    SetSearch(String),
    ToggleStatus(String),
    TogglePriority(String),
    ClearFilters,
    SwitchView(View),
    SwitchTag(String),
    SelectDocument(String),
    CloseDocument,
    Scrolled { view: String, offset: f64 },
}

/// Data last fetched for a session.
#[derive(Debug, Default)]
struct SessionData {
    project: Option<ProjectInfo>,
    tasks: Option<TasksResponse>,
    /// Tasks fetched for an explicitly chosen tag, until the next full reload
    tag_tasks: Option<(String, Vec<TaskRecord>)>,
    stats: Option<TaskStats>,
    documents: Vec<DocumentMeta>,
}

/// One viewer session: view state plus the data it was rendered from.
pub struct ClientSession {
    state: ClientViewState,
    data: SessionData,
    selected_task: Option<TaskRecord>,
    document: Option<Document>,
    phase: Phase,
    scroll_retry: ScrollRetry,
}

impl ClientSession {
    pub fn new(state: ClientViewState) -> Self {
        Self {
            state,
            data: SessionData::default(),
            selected_task: None,
            document: None,
            phase: Phase::Idle,
            scroll_retry: ScrollRetry::default(),
        }
    }

    pub fn with_scroll_retry(mut self, scroll_retry: ScrollRetry) -> Self {
        self.scroll_retry = scroll_retry;
        self
    }

    pub fn state(&self) -> &ClientViewState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn project(&self) -> Option<&ProjectInfo> {
        self.data.project.as_ref()
    }

    pub fn stats(&self) -> Option<&TaskStats> {
        self.data.stats.as_ref()
    }

    pub fn documents(&self) -> &[DocumentMeta] {
        &self.data.documents
    }

    pub fn selected_task(&self) -> Option<&TaskRecord> {
        self.selected_task.as_ref()
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// The tag being shown: the user's pick, else the project's current tag.
    pub fn current_tag(&self) -> &str {
        self.state
            .current_tag
            .as_deref()
            .or(self.data.project.as_ref().map(|p| p.current_tag.as_str()))
            .unwrap_or(TaskFile::DEFAULT_TAG)
    }

    /// Unfiltered top-level tasks of the current tag.
    pub fn current_tasks(&self) -> &[TaskRecord] {
        let tag = self.current_tag();
        if let Some((loaded, tasks)) = &self.data.tag_tasks {
            if loaded == tag {
                return tasks;
            }
        }
        self.data
            .tasks
            .as_ref()
            .map(|tasks| tasks.tasks_for_tag(tag))
            .unwrap_or(&[])
    }

    /// Current tasks after applying the session's filters.
    pub fn visible_tasks(&self) -> Vec<TaskRecord> {
        self.state.filters.apply(self.current_tasks())
    }

    /// Initial load of every resource.
    ///
    /// On failure the renderer shows the generic error state.
    pub async fn load<S, R>(&mut self, source: &S, renderer: &mut R) -> Result<(), ReconcileError>
    where
        S: DataSource + ?Sized,
        R: Renderer + ?Sized,
    {
        self.phase = Phase::Reconciling;
        let result = self.fetch_everything(source).await;
        self.phase = Phase::Idle;

        match result {
            Ok(()) => {
                self.resolve_selection();
                self.prune_expanded();
                self.render(renderer);
                Ok(())
            }
            Err(e) => {
                warn!("Error loading project: {}", e);
                renderer.render_error(&format!("Error loading project: {}", e));
                Err(e)
            }
        }
    }

    /// Merge the resource named by `notification` into this session.
    ///
    /// On a fetch failure the previous data and state are kept untouched.
    pub async fn reconcile<S, R>(
        &mut self,
        notification: ChangeNotification,
        source: &S,
        renderer: &mut R,
    ) -> Result<ReconcileOutcome, ReconcileError>
    where
        S: DataSource + ?Sized,
        R: Renderer + ?Sized,
    {
        debug!("Reconciling {} change", notification.channel.name());
        self.phase = Phase::Reconciling;

        // Capture where the user was before anything is re-rendered
        self.state.scroll_offsets.extend(renderer.scroll_offsets());

        let result = match notification.channel {
            Channel::Tasks => self.refresh_tasks(source).await,
            Channel::Documents => self.refresh_documents(source).await,
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.phase = Phase::Idle;
                warn!("Reload after {} change failed: {}", notification.channel.name(), e);
                return Err(e);
            }
        };

        self.render(renderer);
        self.restore_scroll(renderer).await;
        self.phase = Phase::Idle;

        info!(
            "Reconciled {} change ({:?}, {} expanded pruned)",
            notification.channel.name(),
            outcome.selection,
            outcome.pruned_expanded
        );
        Ok(outcome)
    }

    /// Apply one user interaction and re-render.
    pub async fn interact<S, R>(
        &mut self,
        interaction: Interaction,
        source: &S,
        renderer: &mut R,
    ) -> Result<(), ReconcileError>
    where
        S: DataSource + ?Sized,
        R: Renderer + ?Sized,
    {
        match interaction {
            Interaction::SelectTask(id) => match tree::find(self.current_tasks(), &id).cloned() {
                Some(task) => {
                    self.state.selected_item_id = Some(id);
                    self.selected_task = Some(task);
                    self.state.detail_expanded_ids.clear();
                }
                None => debug!("Ignoring selection of unknown task {}", id),
            },
            Interaction::CloseDetail => {
                self.state.selected_item_id = None;
                self.selected_task = None;
                self.state.detail_expanded_ids.clear();
            }
            Interaction::ToggleExpanded(id) => view::toggle(&mut self.state.expanded_ids, id),
            Interaction::ToggleDetailExpanded(id) => {
                view::toggle(&mut self.state.detail_expanded_ids, id)
            }
            Interaction::SetSearch(search) => self.state.filters.search = search,
            Interaction::ToggleStatus(status) => view::toggle(&mut self.state.filters.status, status),
            Interaction::TogglePriority(priority) => {
                view::toggle(&mut self.state.filters.priority, priority)
            }
            Interaction::ClearFilters => self.state.filters = TaskFilter::default(),
            Interaction::SwitchView(view) => {
                self.state.view = view;
                self.state.selected_item_id = None;
                self.selected_task = None;
                self.state.selected_document = None;
                self.document = None;
            }
            Interaction::SwitchTag(tag) => {
                let tasks = source
                    .tasks_for_tag(&tag)
                    .await
                    .map_err(fetch_failed("tag tasks"))?;
                self.data.tag_tasks = Some((tag.clone(), tasks));
                self.state.current_tag = Some(tag);
                self.resolve_selection();
            }
            Interaction::SelectDocument(filename) => {
                match source
                    .document(&filename)
                    .await
                    .map_err(fetch_failed("document"))?
                {
                    Some(document) => {
                        self.state.selected_document = Some(filename);
                        self.document = Some(document);
                    }
                    None => warn!("Document not found: {}", filename),
                }
            }
            Interaction::CloseDocument => {
                self.state.selected_document = None;
                self.document = None;
            }
            Interaction::Scrolled { view, offset } => {
                self.state.scroll_offsets.insert(view, offset);
                return Ok(());
            }
        }

        self.render(renderer);
        Ok(())
    }

    async fn fetch_everything<S>(&mut self, source: &S) -> Result<(), ReconcileError>
    where
        S: DataSource + ?Sized,
    {
        let (project, tasks, stats, documents) = futures::try_join!(
            async { source.project().await.map_err(fetch_failed("project")) },
            async { source.tasks().await.map_err(fetch_failed("tasks")) },
            async { source.stats().await.map_err(fetch_failed("stats")) },
            async { source.documents().await.map_err(fetch_failed("documents")) },
        )?;

        self.data = SessionData {
            project: Some(project),
            tasks: Some(tasks),
            tag_tasks: None,
            stats: Some(stats),
            documents,
        };

        if let Some(filename) = self.state.selected_document.clone() {
            self.document = source
                .document(&filename)
                .await
                .map_err(fetch_failed("document"))?;
            if self.document.is_none() {
                self.state.selected_document = None;
            }
        }
        Ok(())
    }

    async fn refresh_tasks<S>(&mut self, source: &S) -> Result<ReconcileOutcome, ReconcileError>
    where
        S: DataSource + ?Sized,
    {
        let (project, tasks, stats) = futures::try_join!(
            async { source.project().await.map_err(fetch_failed("project")) },
            async { source.tasks().await.map_err(fetch_failed("tasks")) },
            async { source.stats().await.map_err(fetch_failed("stats")) },
        )?;

        self.data.project = Some(project);
        self.data.tasks = Some(tasks);
        self.data.stats = Some(stats);
        // The full response covers every tag, so a per-tag copy would be stale
        self.data.tag_tasks = None;

        let selection = self.resolve_selection();
        let pruned_expanded = self.prune_expanded();

        Ok(ReconcileOutcome {
            channel: Channel::Tasks,
            selection,
            document_cleared: false,
            pruned_expanded,
        })
    }

    async fn refresh_documents<S>(&mut self, source: &S) -> Result<ReconcileOutcome, ReconcileError>
    where
        S: DataSource + ?Sized,
    {
        let documents = source
            .documents()
            .await
            .map_err(fetch_failed("documents"))?;

        let mut fresh_document = None;
        if let Some(filename) = &self.state.selected_document {
            if documents.iter().any(|doc| &doc.path == filename) {
                fresh_document = source
                    .document(filename)
                    .await
                    .map_err(fetch_failed("document"))?;
            }
        }

        self.data.documents = documents;
        let document_cleared = self.state.selected_document.is_some() && fresh_document.is_none();
        if document_cleared {
            self.state.selected_document = None;
        }
        self.document = fresh_document;

        let selection = match &self.state.selected_item_id {
            Some(id) => SelectionOutcome::Kept(id.clone()),
            None => SelectionOutcome::Unselected,
        };

        Ok(ReconcileOutcome {
            channel: Channel::Documents,
            selection,
            document_cleared,
            pruned_expanded: 0,
        })
    }

    /// Look the selected id up again in the current data.
    fn resolve_selection(&mut self) -> SelectionOutcome {
        let Some(id) = self.state.selected_item_id.clone() else {
            self.selected_task = None;
            return SelectionOutcome::Unselected;
        };

        match tree::find(self.current_tasks(), &id).cloned() {
            Some(task) => {
                self.selected_task = Some(task);
                SelectionOutcome::Kept(id)
            }
            None => {
                self.state.selected_item_id = None;
                self.selected_task = None;
                self.state.detail_expanded_ids.clear();
                SelectionOutcome::Cleared(id)
            }
        }
    }

    fn prune_expanded(&mut self) -> usize {
        let ids = tree::collect_ids(self.current_tasks());
        let before = self.state.expanded_ids.len() + self.state.detail_expanded_ids.len();
        self.state.expanded_ids.retain(|id| ids.contains(id));
        self.state.detail_expanded_ids.retain(|id| ids.contains(id));
        before - (self.state.expanded_ids.len() + self.state.detail_expanded_ids.len())
    }

    fn render<R: Renderer + ?Sized>(&self, renderer: &mut R) {
        let tasks = self.visible_tasks();
        let visible_count = tree::flatten(&tasks).len();
        let tags = self
            .data
            .tasks
            .as_ref()
            .map(|tasks| tasks.tags.as_slice())
            .unwrap_or(&[]);

        let frame = RenderFrame {
            state: &self.state,
            project: self.data.project.as_ref(),
            current_tag: self.current_tag(),
            tags,
            tasks,
            visible_count,
            selected_task: self.selected_task.as_ref(),
            stats: self.data.stats.as_ref(),
            documents: &self.data.documents,
            document: self.document.as_ref(),
        };
        renderer.render(&frame);
    }

    /// Re-apply saved scroll offsets, waiting for layout between attempts.
    async fn restore_scroll<R: Renderer + ?Sized>(&self, renderer: &mut R) {
        for (view, &offset) in &self.state.scroll_offsets {
            if offset <= 0.0 {
                continue;
            }
            let mut attempts = 1;
            while !renderer.restore_scroll(view, offset) {
                if attempts >= self.scroll_retry.attempts {
                    debug!("Gave up restoring scroll for {} after {} attempts", view, attempts);
                    break;
                }
                attempts += 1;
                tokio::time::sleep(self.scroll_retry.delay).await;
            }
        }
    }
}
