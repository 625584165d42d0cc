//! Per-session view state.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::filter::TaskFilter;
use crate::model::TaskId;

/// Scroll container of the task list
pub const TASK_LIST_SCROLL: &str = "task-list";
/// Scroll container of the task detail panel
pub const TASK_DETAIL_SCROLL: &str = "task-detail";
/// Scroll container of an open document
pub const DOCUMENT_SCROLL: &str = "prd-content";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Tasks,
    Documents,
}

/// What one session is looking at.
///
/// Owned by a single `ClientSession`. Reconciliation updates it in place and
/// never rebuilds it: only a selection whose item disappeared is cleared, and
/// expanded ids that disappeared are pruned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientViewState {
    pub view: View,
    /// Tag picked by the user; `None` follows the project's current tag
    pub current_tag: Option<String>,
    pub selected_item_id: Option<TaskId>,
    pub selected_document: Option<String>,
    /// Tasks expanded in the list
    pub expanded_ids: BTreeSet<TaskId>,
    /// Subtasks expanded inside the detail panel
    pub detail_expanded_ids: BTreeSet<TaskId>,
    pub scroll_offsets: BTreeMap<String, f64>,
    pub filters: TaskFilter,
}

pub(crate) fn toggle<T: Ord>(set: &mut BTreeSet<T>, value: T) {
    if !set.remove(&value) {
        set.insert(value);
    }
}
