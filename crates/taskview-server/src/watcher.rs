//! File watcher for the task database and the docs directory.
//!
//! Each watch target is one directory, watched non-recursively, tagged with
//! the channel its changes belong to. Raw events are forwarded from the
//! notify backend thread into a tokio channel; coalescing happens later in
//! the debouncer.

use std::path::{Path, PathBuf};

use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use taskview_core::Channel;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::store::is_document_name;

/// Which files in a watched directory matter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relevance {
    /// Exactly this file name
    File(String),
    /// Non-hidden `.md` and `.txt` files
    Documents,
}

impl Relevance {
    pub fn matches(&self, filename: &str) -> bool {
        match self {
            Relevance::File(name) => filename == name,
            Relevance::Documents => is_document_name(filename),
        }
    }
}

/// A directory to watch and the channel its changes are reported on.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    pub directory: PathBuf,
    pub channel: Channel,
    pub relevance: Relevance,
}

impl WatchTarget {
    pub fn new(directory: impl Into<PathBuf>, channel: Channel, relevance: Relevance) -> Self {
        Self {
            directory: directory.into(),
            channel,
            relevance,
        }
    }
}

/// Raw change reported by the backend, before debouncing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub channel: Channel,
    pub directory: PathBuf,
    pub filename: String,
}

/// Watches a set of directories until dropped.
pub struct FileWatcher {
    /// Backend handle (must keep alive)
    _watcher: RecommendedWatcher,
    /// Targets actually being watched
    watched: Vec<WatchTarget>,
    event_rx: mpsc::UnboundedReceiver<RawChange>,
}

impl FileWatcher {
    /// Start watching. Targets whose directory does not exist are skipped.
    pub fn new(targets: Vec<WatchTarget>) -> Result<Self> {
        // Resolve symlinks so event paths compare equal to target paths.
        // On macOS, /var/folders/... is really /private/var/folders/...
        let targets: Vec<WatchTarget> = targets
            .into_iter()
            .map(|target| WatchTarget {
                directory: target
                    .directory
                    .canonicalize()
                    .unwrap_or(target.directory),
                ..target
            })
            .collect();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let routes = targets.clone();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    for change in Self::process_event(&event, &routes) {
                        if event_tx.send(change).is_err() {
                            // Receiver dropped
                            return;
                        }
                    }
                }
                Err(e) => {
                    error!("File watcher error: {}", e);
                }
            }
        })?;

        let mut watched = Vec::new();
        for target in targets {
            if !target.directory.is_dir() {
                debug!(
                    "Not watching {} ({} channel): directory does not exist",
                    target.directory.display(),
                    target.channel.name()
                );
                continue;
            }
            watcher.watch(&target.directory, RecursiveMode::NonRecursive)?;
            info!(
                "Watching {} for {} changes",
                target.directory.display(),
                target.channel.name()
            );
            watched.push(target);
        }

        Ok(Self {
            _watcher: watcher,
            watched,
            event_rx,
        })
    }

    /// Map one backend event to the relevant changes it represents.
    fn process_event(event: &Event, targets: &[WatchTarget]) -> Vec<RawChange> {
        if matches!(event.kind, EventKind::Access(_)) {
            return Vec::new();
        }

        let mut changes = Vec::new();
        for path in &event.paths {
            if let Some(change) = Self::route(path, targets) {
                if !changes.contains(&change) {
                    debug!(
                        "Change on {} channel: {}",
                        change.channel.name(),
                        change.filename
                    );
                    changes.push(change);
                }
            }
        }
        changes
    }

    fn route(path: &Path, targets: &[WatchTarget]) -> Option<RawChange> {
        let directory = path.parent()?;
        let filename = path.file_name()?.to_str()?;

        targets
            .iter()
            .find(|target| target.directory == directory && target.relevance.matches(filename))
            .map(|target| RawChange {
                channel: target.channel,
                directory: target.directory.clone(),
                filename: filename.to_string(),
            })
    }

    /// Get the receiver for raw changes.
    pub fn event_rx(&mut self) -> &mut mpsc::UnboundedReceiver<RawChange> {
        &mut self.event_rx
    }

    /// Targets that are being watched.
    pub fn watched(&self) -> &[WatchTarget] {
        &self.watched
    }
}
