//! Hierarchical task filtering.
//!
//! A task stays visible when it matches the filter itself, or when at least
//! one descendant does. A task that matches keeps its whole subtree; a task
//! kept only as context for a matching descendant keeps just the visible
//! branches below it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::TaskRecord;
use crate::tree::MAX_DEPTH;

/// Status, priority, and free-text constraints.
///
/// Empty sets and an empty search string impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(default)]
    pub status: BTreeSet<String>,
    #[serde(default)]
    pub priority: BTreeSet<String>,
    #[serde(default)]
    pub search: String,
}

impl TaskFilter {
    pub fn is_active(&self) -> bool {
        !self.status.is_empty() || !self.priority.is_empty() || !self.search.is_empty()
    }

    /// Whether a single task satisfies every constraint, ignoring its subtasks.
    pub fn matches(&self, task: &TaskRecord) -> bool {
        if !self.status.is_empty() && !self.status.contains(&task.status) {
            return false;
        }

        if !self.priority.is_empty()
            && !task
                .priority
                .as_ref()
                .is_some_and(|priority| self.priority.contains(priority))
        {
            return false;
        }

        if self.search.is_empty() {
            return true;
        }

        let needle = self.search.to_lowercase();
        task.title.to_lowercase().contains(&needle)
            || task
                .description
                .as_ref()
                .is_some_and(|description| description.to_lowercase().contains(&needle))
            || task.id.as_str().to_lowercase().contains(&needle)
    }

    /// Compute the visible forest. The input is left untouched.
    pub fn apply(&self, tasks: &[TaskRecord]) -> Vec<TaskRecord> {
        if !self.is_active() {
            return tasks.to_vec();
        }
        tasks
            .iter()
            .filter_map(|task| self.visible(task, 0))
            .collect()
    }

    fn visible(&self, task: &TaskRecord, depth: usize) -> Option<TaskRecord> {
        if self.matches(task) {
            return Some(task.clone());
        }
        if depth >= MAX_DEPTH {
            return None;
        }

        let children: Vec<TaskRecord> = task
            .subtasks
            .iter()
            .filter_map(|child| self.visible(child, depth + 1))
            .collect();

        if children.is_empty() {
            None
        } else {
            Some(task.with_subtasks(children))
        }
    }
}
