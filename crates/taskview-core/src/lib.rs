//! taskview-core: Shared model and client-side logic for the taskview viewer.
//!
//! Everything in here is independent of transport:
//! - `model` parses `tasks.json` (legacy and tagged shapes) and validates ids
//! - `tree` and `filter` walk task hierarchies without mutating them
//! - `event` defines the change notifications pushed to browsers
//! - `reconcile` merges fresh data into a session's view state

pub mod error;
pub mod event;
pub mod filter;
pub mod model;
pub mod project;
pub mod reconcile;
pub mod stats;
pub mod tree;
pub mod view;

// Re-export key types for convenience
pub use error::{FetchError, ModelError};
pub use event::{ChangeNotification, Channel, EventFrame};
pub use filter::TaskFilter;
pub use model::{TagGroup, TaskFile, TaskFormat, TaskId, TaskRecord, TasksResponse};
pub use project::{Document, DocumentMeta, ProjectInfo};
pub use reconcile::{
    ClientSession, DataSource, Interaction, Phase, ReconcileError, ReconcileOutcome, RenderFrame,
    Renderer, ScrollRetry, SelectionOutcome,
};
pub use stats::TaskStats;
pub use view::{ClientViewState, DOCUMENT_SCROLL, TASK_DETAIL_SCROLL, TASK_LIST_SCROLL, View};
