//! Task counts shown next to the sidebar filters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::TaskFile;

/// Bucket used for tasks without a priority.
pub const NO_PRIORITY: &str = "none";

/// Body of `GET /api/stats`. Counts top-level tasks across every tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: usize,
    #[serde(default)]
    pub by_status: BTreeMap<String, usize>,
    #[serde(default)]
    pub by_priority: BTreeMap<String, usize>,
    #[serde(default)]
    pub by_tag: BTreeMap<String, usize>,
}

impl TaskStats {
    pub fn from_file(file: &TaskFile) -> Self {
        let mut stats = TaskStats::default();

        for (tag, tasks) in file.groups() {
            stats.by_tag.insert(tag.to_string(), tasks.len());
            stats.total += tasks.len();

            for task in tasks {
                *stats.by_status.entry(task.status.clone()).or_default() += 1;
                let priority = task.priority.as_deref().unwrap_or(NO_PRIORITY);
                *stats.by_priority.entry(priority.to_string()).or_default() += 1;
            }
        }

        stats
    }
}
